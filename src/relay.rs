//! SMTP relay for forwarding messages unchanged to a fallback address.

use std::sync::Arc;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::error::ForwardError;

/// Re-sends raw messages through an SMTP submission server.
pub struct SmtpRelay {
    transport: Arc<SmtpTransport>,
    host: String,
}

impl SmtpRelay {
    pub fn new(config: &SmtpConfig) -> Result<Self, ForwardError> {
        let mut builder = SmtpTransport::relay(&config.host)
            .map_err(|e| ForwardError::Relay(format!("SMTP relay error: {e}")))?
            .port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: Arc::new(builder.build()),
            host: config.host.clone(),
        })
    }

    /// Send `raw` to `to`, keeping the original envelope sender. An empty
    /// sender (bounces) is relayed with a null reverse-path.
    pub async fn forward(&self, from: &str, to: &str, raw: Vec<u8>) -> Result<(), ForwardError> {
        let envelope = build_envelope(from, to)?;
        let transport = Arc::clone(&self.transport);

        tokio::task::spawn_blocking(move || transport.send_raw(&envelope, &raw))
            .await
            .map_err(|e| ForwardError::Relay(format!("relay task panicked: {e}")))?
            .map_err(|e| ForwardError::Relay(format!("SMTP send failed: {e}")))?;

        tracing::info!(host = %self.host, "Forwarded message to {to}");
        Ok(())
    }
}

fn parse_address(address: &str) -> Result<Address, ForwardError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| ForwardError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Envelope for a forward: original sender (or null) to the fallback address.
pub fn build_envelope(from: &str, to: &str) -> Result<Envelope, ForwardError> {
    let reverse_path = match from.trim() {
        "" | "<>" => None,
        sender => Some(parse_address(sender)?),
    };
    let recipient = parse_address(to)?;

    Envelope::new(reverse_path, vec![recipient]).map_err(|e| ForwardError::InvalidAddress {
        address: to.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_keeps_original_sender() {
        let envelope = build_envelope("sa@test-domain.com", "catch-all@example.com").unwrap();
        assert_eq!(
            envelope.from().map(ToString::to_string).as_deref(),
            Some("sa@test-domain.com")
        );
        assert_eq!(envelope.to().len(), 1);
        assert_eq!(envelope.to()[0].to_string(), "catch-all@example.com");
    }

    #[test]
    fn envelope_null_sender() {
        let envelope = build_envelope("", "catch-all@example.com").unwrap();
        assert!(envelope.from().is_none());
        let envelope = build_envelope("<>", "catch-all@example.com").unwrap();
        assert!(envelope.from().is_none());
    }

    #[test]
    fn envelope_rejects_bad_recipient() {
        let err = build_envelope("a@example.com", "not an address").unwrap_err();
        assert!(matches!(err, ForwardError::InvalidAddress { .. }));
    }

    #[test]
    fn relay_builds_without_credentials() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let config = SmtpConfig {
            host: "smtp.test.com".into(),
            port: 587,
            username: String::new(),
            password: secrecy::SecretString::from(""),
        };
        assert!(SmtpRelay::new(&config).is_ok());
    }
}
