//! Inbound message abstraction.
//!
//! The receiving platform owns the message; the gatekeeper only reads it and
//! calls one of its terminal actions.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ForwardError;
use crate::relay::SmtpRelay;

/// A message handed to the gatekeeper by the mail-receiving platform.
#[async_trait]
pub trait InboundMessage: Send + Sync {
    /// Envelope sender address.
    fn sender(&self) -> &str;

    /// Envelope recipient address.
    fn recipient(&self) -> &str;

    /// Raw RFC 5322 bytes, if the platform supplied any.
    fn raw(&self) -> Option<&[u8]>;

    fn raw_size(&self) -> usize {
        self.raw().map_or(0, <[u8]>::len)
    }

    /// Refuse the message with a reason shown to the sending server.
    fn set_reject(&self, reason: &str);

    /// Deliver the message to `address` instead.
    async fn forward(&self, address: &str) -> Result<(), ForwardError>;
}

/// The single terminal action taken for a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Disposition {
    /// Notification sent; the platform takes no further action.
    Notified,
    Rejected { reason: String },
    Forwarded { to: String },
}

/// An `InboundMessage` that remembers what happened to it.
///
/// Only the first terminal action counts; later ones are logged and ignored.
/// Forwards go through the SMTP relay when one is attached, otherwise they
/// are only recorded for the caller to carry out.
pub struct RecordedMessage {
    sender: String,
    recipient: String,
    raw: Option<Vec<u8>>,
    relay: Option<Arc<SmtpRelay>>,
    outcome: Mutex<Option<Disposition>>,
    forward_calls: Mutex<Vec<String>>,
}

impl RecordedMessage {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        raw: Option<Vec<u8>>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            raw,
            relay: None,
            outcome: Mutex::new(None),
            forward_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_relay(mut self, relay: Arc<SmtpRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// The recorded terminal action; no reject or forward means the message
    /// was accepted.
    pub fn disposition(&self) -> Disposition {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or(Disposition::Notified)
    }

    /// Reason passed to `set_reject`, if it was called.
    pub fn reject_reason(&self) -> Option<String> {
        match self.disposition() {
            Disposition::Rejected { reason } => Some(reason),
            _ => None,
        }
    }

    /// Every address `forward` was called with, including ignored calls.
    pub fn forward_calls(&self) -> Vec<String> {
        self.forward_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_settled(&self) -> bool {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn record(&self, disposition: Disposition) {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = outcome.as_ref() {
            tracing::warn!(?existing, ignored = ?disposition, "Message already has a terminal action");
            return;
        }
        *outcome = Some(disposition);
    }
}

#[async_trait]
impl InboundMessage for RecordedMessage {
    fn sender(&self) -> &str {
        &self.sender
    }

    fn recipient(&self) -> &str {
        &self.recipient
    }

    fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    fn set_reject(&self, reason: &str) {
        self.record(Disposition::Rejected {
            reason: reason.to_string(),
        });
    }

    async fn forward(&self, address: &str) -> Result<(), ForwardError> {
        self.forward_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(address.to_string());

        if self.is_settled() {
            tracing::warn!(to = address, "Ignoring forward for a settled message");
            return Ok(());
        }

        if let Some(relay) = &self.relay {
            let raw = self.raw.clone().unwrap_or_default();
            relay.forward(&self.sender, address, raw).await?;
        }

        self.record(Disposition::Forwarded {
            to: address.to_string(),
        });
        Ok(())
    }
}
