//! Push notification client (ntfy-style HTTP API).
//!
//! One POST per allowed message. The body is the composed text encoded as a
//! JSON string; the subject travels in the `Title` header.

use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::config::NotifyTarget;
use crate::email::render_date;
use crate::error::NotifyError;

/// Static `Tags` header value.
pub const TAGS: &str = "email";
/// Fixed `X-Priority` header value.
pub const PRIORITY: &str = "5";

/// A composed notification, ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Subject of the email; `None` omits the `Title` header.
    pub title: Option<String>,
    /// Text shown in the notification.
    pub message: String,
}

impl Notification {
    /// Build `"{text}\n\nFrom: {sender}\nDate: {date}"`.
    pub fn compose(
        plain_text: &str,
        sender: &str,
        date: Option<DateTime<Utc>>,
        subject: Option<&str>,
    ) -> Self {
        Self {
            title: subject.map(header_safe),
            message: format!(
                "{plain_text}\n\nFrom: {sender}\nDate: {}",
                render_date(date)
            ),
        }
    }
}

/// Header values cannot carry control characters; a folded or tabbed
/// subject would otherwise make the request unbuildable.
fn header_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

// ── Response diagnostics ────────────────────────────────────────────

/// How an error response body should be read, decided by `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Text,
    Html,
    Other,
}

impl BodyKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let ct = content_type.unwrap_or_default();
        if ct.contains("application/json") {
            Self::Json
        } else if ct.contains("application/text") {
            Self::Text
        } else if ct.contains("text/html") {
            Self::Html
        } else {
            Self::Other
        }
    }
}

/// Body of a failed response, captured for logging only.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Html(String),
    Raw(String),
}

impl ResponseBody {
    /// Classify a body that has already been read as text. JSON that fails
    /// to decode is kept as raw text.
    pub fn classify(kind: BodyKind, text: String) -> Self {
        match kind {
            BodyKind::Json => match serde_json::from_str(&text) {
                Ok(value) => Self::Json(value),
                Err(_) => Self::Raw(text),
            },
            BodyKind::Text => Self::Text(text),
            BodyKind::Html => Self::Html(text),
            BodyKind::Other => Self::Raw(text),
        }
    }

    async fn read(response: reqwest::Response) -> Self {
        let kind = BodyKind::from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let text = response.text().await.unwrap_or_default();
        Self::classify(kind, text)
    }

    /// Rendering used in logs and errors; JSON is re-serialized compactly.
    pub fn render(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) | Self::Html(text) | Self::Raw(text) => text.clone(),
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Sends notifications over HTTP.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    client: reqwest::Client,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// The POST for one notification; the message goes out as a JSON string.
    fn request(&self, target: &NotifyTarget, notification: &Notification) -> RequestBuilder {
        let request = self
            .client
            .post(&target.endpoint)
            .bearer_auth(target.token.expose_secret())
            .header("Tags", TAGS)
            .header("X-Priority", PRIORITY)
            .header(ACCEPT, "application/json")
            .json(&notification.message);
        match &notification.title {
            Some(title) => request.header("Title", title.as_str()),
            None => request,
        }
    }

    /// POST the notification. Any non-success status is an error, whatever
    /// the code.
    pub async fn send(
        &self,
        target: &NotifyTarget,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let response = self
            .request(target, notification)
            .send()
            .await
            .map_err(|e| NotifyError::Network {
                endpoint: target.endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = ResponseBody::read(response).await;
        tracing::debug!(status = status.as_u16(), body = ?body, "Notification endpoint rejected request");
        Err(NotifyError::Status {
            status: status.as_u16(),
            body: body.render(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn march_11() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-11T20:54:05Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn compose_formats_message() {
        let n = Notification::compose(
            "This is a test email message.",
            "sa@example-sender.com",
            Some(march_11()),
            Some("Test Email"),
        );
        assert_eq!(
            n.message,
            "This is a test email message.\n\nFrom: sa@example-sender.com\nDate: 2025-03-11T20:54:05.000Z"
        );
        assert_eq!(n.title.as_deref(), Some("Test Email"));
    }

    #[test]
    fn compose_without_date_or_subject() {
        let n = Notification::compose("hi", "a@b.c", None, None);
        assert_eq!(n.message, "hi\n\nFrom: a@b.c\nDate: unknown");
        assert!(n.title.is_none());
    }

    #[test]
    fn request_body_is_json_string() {
        let n = Notification::compose("say \"hi\"", "a@b.c", Some(march_11()), None);
        let target = NotifyTarget {
            endpoint: "http://127.0.0.1:9/topic".into(),
            token: secrecy::SecretString::from("t"),
        };
        let request = Notifier::new().request(&target, &n).build().unwrap();

        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert!(body.starts_with(b"\""));
        let decoded: String = serde_json::from_slice(body).unwrap();
        assert_eq!(decoded, n.message);
    }

    #[test]
    fn title_control_characters_are_replaced() {
        let n = Notification::compose("x", "a@b.c", None, Some("Line one\r\n\tline two"));
        assert_eq!(n.title.as_deref(), Some("Line one   line two"));
    }

    #[test]
    fn body_kind_from_content_type() {
        assert_eq!(
            BodyKind::from_content_type(Some("application/json; charset=utf-8")),
            BodyKind::Json
        );
        assert_eq!(
            BodyKind::from_content_type(Some("application/text")),
            BodyKind::Text
        );
        assert_eq!(BodyKind::from_content_type(Some("text/html")), BodyKind::Html);
        assert_eq!(
            BodyKind::from_content_type(Some("application/octet-stream")),
            BodyKind::Other
        );
        assert_eq!(BodyKind::from_content_type(None), BodyKind::Other);
    }

    #[test]
    fn json_body_is_reserialized() {
        let body = ResponseBody::classify(BodyKind::Json, "{ \"status\" : \"error\" }".into());
        assert_eq!(body, ResponseBody::Json(serde_json::json!({"status": "error"})));
        assert_eq!(body.render(), r#"{"status":"error"}"#);
    }

    #[test]
    fn invalid_json_body_falls_back_to_raw() {
        let body = ResponseBody::classify(BodyKind::Json, "<html>oops</html>".into());
        assert_eq!(body, ResponseBody::Raw("<html>oops</html>".into()));
    }

    #[test]
    fn other_bodies_are_kept_verbatim() {
        assert_eq!(
            ResponseBody::classify(BodyKind::Html, "<p>x</p>".into()).render(),
            "<p>x</p>"
        );
        assert_eq!(
            ResponseBody::classify(BodyKind::Other, "Binary data".into()).render(),
            "Binary data"
        );
    }
}
