//! Sender allowlist policy.

use serde::Serialize;

use crate::config::GatekeeperConfig;

/// Domain part of an address: everything after the last `@`, or empty.
pub fn sender_domain(address: &str) -> &str {
    address.rfind('@').map_or("", |at| &address[at + 1..])
}

/// Outcome of checking a sender against the allowlists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderVerdict {
    pub domain: String,
    pub is_allowed_sender: bool,
    pub is_allowed_domain: bool,
}

impl SenderVerdict {
    /// Compare the full address against `allowed_senders` and its domain
    /// against `allowed_domains`, both case-insensitively.
    pub fn evaluate(sender: &str, config: &GatekeeperConfig) -> Self {
        let domain = sender_domain(sender);
        Self {
            domain: domain.to_string(),
            is_allowed_sender: matches_any(&config.allowed_senders, sender),
            is_allowed_domain: matches_any(&config.allowed_domains, domain),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.is_allowed_sender || self.is_allowed_domain
    }
}

fn matches_any(allowed: &[String], value: &str) -> bool {
    let value = value.to_lowercase();
    allowed.iter().any(|entry| entry.to_lowercase() == value)
}
