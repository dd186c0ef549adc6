//! Error types for the gatekeeper.
//!
//! Every variant here ends the invocation with the same caller-visible
//! rejection; the variants only exist so the logs say what went wrong.

/// Top-level error for a single gatekeeper invocation.
#[derive(Debug, thiserror::Error)]
pub enum GatekeeperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Forward error: {0}")]
    Forward(#[from] ForwardError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors turning the raw message into something we can summarize.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Message has no raw content")]
    NoContent,

    #[error("Message could not be decoded as MIME")]
    Malformed,

    #[error("Message has neither a text nor an HTML body")]
    NoBody,

    #[error("HTML conversion failed: {0}")]
    Html(String),
}

/// Errors talking to the push notification endpoint.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Request to {endpoint} failed: {reason}")]
    Network { endpoint: String, reason: String },

    #[error("Endpoint responded with {status}: {body}")]
    Status { status: u16, body: String },
}

/// Errors handing the message to its fallback destination.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("SMTP relay failed: {0}")]
    Relay(String),
}

/// Result type alias for the gatekeeper.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
