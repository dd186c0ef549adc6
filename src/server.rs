//! HTTP host for the gatekeeper.
//!
//! The mail platform (or an MTA hook) POSTs each raw message to `/inbound`
//! with the envelope in headers and gets the terminal action back as JSON.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::GatekeeperConfig;
use crate::gatekeeper::Gatekeeper;
use crate::message::RecordedMessage;
use crate::relay::SmtpRelay;

/// Envelope sender header.
pub const ENVELOPE_FROM: &str = "x-envelope-from";
/// Envelope recipient header.
pub const ENVELOPE_TO: &str = "x-envelope-to";

/// Largest raw message accepted on `/inbound`.
const MAX_MESSAGE_BYTES: usize = 25 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub gatekeeper: Arc<Gatekeeper>,
    /// Loaded once at startup and handed to every invocation.
    pub config: Arc<GatekeeperConfig>,
    /// Performs forwards; `None` leaves delivery to the caller.
    pub relay: Option<Arc<SmtpRelay>>,
}

/// Build the Axum router with the inbound and health routes.
pub fn gatekeeper_routes(state: AppState) -> Router {
    Router::new()
        .route("/inbound", post(inbound))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "email-gatekeeper"
    }))
}

async fn inbound(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(sender) = header_value(&headers, ENVELOPE_FROM) else {
        warn!("Inbound request without envelope sender");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Missing X-Envelope-From header"})),
        );
    };
    let recipient = header_value(&headers, ENVELOPE_TO).unwrap_or_default();

    let raw = (!body.is_empty()).then(|| body.to_vec());
    let mut message = RecordedMessage::new(sender, recipient, raw);
    if let Some(relay) = &state.relay {
        message = message.with_relay(Arc::clone(relay));
    }

    let disposition = state.gatekeeper.process(&message, &state.config).await;
    (StatusCode::OK, Json(serde_json::json!(disposition)))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
