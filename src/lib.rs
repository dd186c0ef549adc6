//! Email Gatekeeper: relays mail from trusted senders as push notifications.

pub mod config;
pub mod email;
pub mod error;
pub mod gatekeeper;
pub mod message;
pub mod notify;
pub mod policy;
pub mod relay;
pub mod server;

pub use config::GatekeeperConfig;
pub use gatekeeper::Gatekeeper;
pub use message::{Disposition, InboundMessage, RecordedMessage};
