//! Configuration types.
//!
//! The gatekeeper never reads ambient state: a `GatekeeperConfig` is built
//! once (from the environment or a JSON bag) and handed to every invocation.

use std::path::Path;

use secrecy::SecretString;
use serde_json::Value;

use crate::error::ConfigError;

/// Key holding the notification endpoint (topic URL).
pub const TOPIC_KEY: &str = "NTFY_TOPIC";
/// Key holding the bearer token for the notification endpoint.
pub const TOKEN_KEY: &str = "NTFY_TOKEN";

/// Per-invocation gatekeeper settings.
#[derive(Debug, Clone, Default)]
pub struct GatekeeperConfig {
    /// Fallback destination for mail from senders that are not allowlisted.
    pub forwarding_address: Option<String>,
    /// Full sender addresses that are trusted (case-insensitive).
    pub allowed_senders: Vec<String>,
    /// Sender domains that are trusted (case-insensitive).
    pub allowed_domains: Vec<String>,
    /// Notification endpoint URL.
    pub ntfy_topic: Option<String>,
    /// Notification auth token.
    pub ntfy_token: Option<SecretString>,
}

/// The validated endpoint/token pair needed to send a notification.
#[derive(Debug, Clone)]
pub struct NotifyTarget {
    pub endpoint: String,
    pub token: SecretString,
}

impl GatekeeperConfig {
    /// Build config from a JSON configuration bag.
    ///
    /// Values of the wrong shape are treated as absent: a string where a list
    /// is expected yields an empty list, and non-string list entries are
    /// skipped.
    pub fn from_value(bag: &Value) -> Self {
        Self {
            forwarding_address: string_entry(bag, "forwarding_address"),
            allowed_senders: list_entry(bag, "allowed_senders"),
            allowed_domains: list_entry(bag, "allowed_domains"),
            ntfy_topic: string_entry(bag, TOPIC_KEY),
            ntfy_token: string_entry(bag, TOKEN_KEY).map(SecretString::from),
        }
    }

    /// Load a JSON configuration bag from disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let bag: Value = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        Ok(Self::from_value(&bag))
    }

    /// Build config from environment variables.
    ///
    /// `GATEKEEPER_CONFIG` may name a JSON file used as the base; the
    /// individual variables override whatever it sets.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = match get("GATEKEEPER_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(topic) = get(TOPIC_KEY) {
            config.ntfy_topic = Some(topic);
        }
        if let Some(token) = get(TOKEN_KEY) {
            config.ntfy_token = Some(SecretString::from(token));
        }
        if let Some(address) = get("FORWARDING_ADDRESS") {
            config.forwarding_address = Some(address.trim().to_string());
        }
        if let Some(senders) = get("ALLOWED_SENDERS") {
            config.allowed_senders = split_list(&senders);
        }
        if let Some(domains) = get("ALLOWED_DOMAINS") {
            config.allowed_domains = split_list(&domains);
        }

        Ok(config)
    }

    /// Check that the notification secrets are present.
    pub fn notify_target(&self) -> Result<NotifyTarget, ConfigError> {
        let endpoint = self
            .ntfy_topic
            .clone()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: TOPIC_KEY.into(),
                hint: "Please create a secret with the topic URL.".into(),
            })?;
        let token = self
            .ntfy_token
            .clone()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: TOKEN_KEY.into(),
                hint: "Please create a secret with the token.".into(),
            })?;
        Ok(NotifyTarget { endpoint, token })
    }

    /// Human-readable allowlist summary for startup logs.
    pub fn allowlist_summary(&self) -> String {
        if self.allowed_senders.is_empty() && self.allowed_domains.is_empty() {
            return "none (nothing is allowed)".to_string();
        }
        format!(
            "senders: [{}], domains: [{}]",
            self.allowed_senders.join(", "),
            self.allowed_domains.join(", ")
        )
    }
}

fn string_entry(bag: &Value, key: &str) -> Option<String> {
    bag.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn list_entry(bag: &Value, key: &str) -> Vec<String> {
    bag.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Outbound SMTP relay used to perform forwards.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    /// Returns `None` if `SMTP_HOST` is not set (forwards are only recorded).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok().filter(|h| !h.is_empty())?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());

        Some(Self {
            host,
            port,
            username,
            password,
        })
    }
}

/// HTTP host settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub smtp: Option<SmtpConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = match std::env::var("GATEKEEPER_PORT") {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "GATEKEEPER_PORT".into(),
                message: format!("{raw:?}: {e}"),
            })?,
            Err(_) => 8080,
        };

        Ok(Self {
            port,
            smtp: SmtpConfig::from_env(),
        })
    }
}
