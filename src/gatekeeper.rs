//! The gatekeeper decision procedure.
//!
//! One call per inbound message: validate config, parse, check the sender,
//! then notify, forward or reject. Every error collapses into the same
//! rejection text; only the logs tell the error kinds apart.

use crate::config::GatekeeperConfig;
use crate::email::ParsedEmail;
use crate::error::{GatekeeperError, NotifyError, Result};
use crate::message::{Disposition, InboundMessage};
use crate::notify::{Notification, Notifier, PRIORITY, TAGS};
use crate::policy::SenderVerdict;

/// Rejection reason for any processing failure.
pub const FAILED_TO_PROCESS: &str = "Failed to process email.";

/// Rejection reason when the sender is not allowlisted and there is no
/// forwarding address.
pub const NOT_ALLOWED: &str = "Sender or domain not in allowed list.";

/// Decides what happens to each inbound message.
#[derive(Debug, Clone, Default)]
pub struct Gatekeeper {
    notifier: Notifier,
}

impl Gatekeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(notifier: Notifier) -> Self {
        Self { notifier }
    }

    /// Process one message, performing exactly one terminal action on it.
    #[tracing::instrument(
        name = "email",
        skip_all,
        fields(id = %uuid::Uuid::new_v4(), from = %message.sender(), to = %message.recipient())
    )]
    pub async fn process(
        &self,
        message: &dyn InboundMessage,
        config: &GatekeeperConfig,
    ) -> Disposition {
        match self.try_process(message, config).await {
            Ok(disposition) => disposition,
            Err(e) => {
                tracing::error!(error = %e, "Failed to process email");
                message.set_reject(FAILED_TO_PROCESS);
                Disposition::Rejected {
                    reason: FAILED_TO_PROCESS.to_string(),
                }
            }
        }
    }

    async fn try_process(
        &self,
        message: &dyn InboundMessage,
        config: &GatekeeperConfig,
    ) -> Result<Disposition> {
        let target = config.notify_target()?;

        tracing::debug!(raw_size = message.raw_size(), "Parsing message");
        let email = ParsedEmail::parse(message.raw())?;
        let plain_text = email.plain_text()?;

        let sender = message.sender();
        let verdict = SenderVerdict::evaluate(sender, config);
        tracing::info!(
            domain = %verdict.domain,
            is_allowed_sender = verdict.is_allowed_sender,
            is_allowed_domain = verdict.is_allowed_domain,
            "Sender checked"
        );

        if verdict.is_allowed() {
            let notification =
                Notification::compose(&plain_text, sender, email.date, email.subject.as_deref());

            if let Err(e) = self.notifier.send(&target, &notification).await {
                if let NotifyError::Status { status, body } = &e {
                    tracing::warn!(
                        endpoint = %target.endpoint,
                        title = ?notification.title,
                        tags = TAGS,
                        priority = PRIORITY,
                        body = ?notification.message,
                        ?email,
                        status,
                        response = %body,
                        "Notification request failed"
                    );
                }
                return Err(GatekeeperError::Notify(e));
            }

            tracing::info!("Email processed and forwarded to API");
            return Ok(Disposition::Notified);
        }

        tracing::info!("Sender or domain not in allowed list");

        match &config.forwarding_address {
            Some(address) => {
                message.forward(address).await?;
                tracing::info!(to = %address, "Forwarded message");
                Ok(Disposition::Forwarded {
                    to: address.clone(),
                })
            }
            None => {
                tracing::info!("No forwarding address provided");
                message.set_reject(NOT_ALLOWED);
                Ok(Disposition::Rejected {
                    reason: NOT_ALLOWED.to_string(),
                })
            }
        }
    }
}
