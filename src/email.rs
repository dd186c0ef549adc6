//! Raw message decoding: subject, date and a plain-text body.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use htmd::{Element, HtmlToMarkdown};
use mail_parser::{Message, MessageParser, PartType};
use serde::Serialize;

use crate::error::ParseError;

/// The fields of an inbound message the gatekeeper cares about.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedEmail {
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl ParsedEmail {
    /// Decode a raw RFC 5322 message.
    ///
    /// Absent or empty content, or bytes without a single well-formed header
    /// field, are parse failures.
    pub fn parse(raw: Option<&[u8]>) -> Result<Self, ParseError> {
        let raw = raw.filter(|r| !r.is_empty()).ok_or(ParseError::NoContent)?;

        let parsed = MessageParser::default()
            .parse(raw)
            .ok_or(ParseError::Malformed)?;
        // A header-less blob still comes back as one header whose "name" is
        // the whole first line.
        if !parsed.headers().iter().any(|h| is_field_name(h.name())) {
            return Err(ParseError::Malformed);
        }

        Ok(Self {
            subject: parsed.subject().map(str::to_string),
            text: first_text_part(&parsed),
            html: first_html_part(&parsed),
            date: parsed
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        })
    }

    /// Plain-text body, converting the HTML part when there is no text part.
    pub fn plain_text(&self) -> Result<String, ParseError> {
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            return Ok(text.trim().to_string());
        }
        if let Some(html) = self.html.as_deref().filter(|h| !h.is_empty()) {
            let converted = html_to_text(html)?;
            if !converted.is_empty() {
                return Ok(converted.trim().to_string());
            }
        }
        Err(ParseError::NoBody)
    }

    /// Date rendered as ISO 8601 with millisecond precision, e.g.
    /// `2025-03-11T20:54:05.000Z`.
    pub fn date_display(&self) -> String {
        render_date(self.date)
    }
}

/// Render an optional timestamp the way notifications show it.
pub fn render_date(date: Option<DateTime<Utc>>) -> String {
    date.map_or_else(
        || "unknown".to_string(),
        |d| d.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Convert an HTML body to plain text.
///
/// `head`, `style` and `script` are dropped, inline formatting keeps only its
/// text, links render as `text [href]` and list items as ` * item`.
pub fn html_to_text(html: &str) -> Result<String, ParseError> {
    static CONVERTER: LazyLock<HtmlToMarkdown> = LazyLock::new(|| {
        HtmlToMarkdown::builder()
            .skip_tags(vec!["head", "style", "script", "noscript", "template", "img"])
            .add_handler(
                vec!["b", "strong", "i", "em", "u", "s", "del", "code", "span", "font"],
                inline_text,
            )
            .add_handler(vec!["a"], link_text)
            .add_handler(vec!["li"], list_item_text)
            .add_handler(
                vec!["ul", "ol", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6", "hr"],
                block_text,
            )
            .add_handler(vec!["br"], |_: Element| Some("\n".to_string()))
            .build()
    });

    let converted = CONVERTER
        .convert(html)
        .map_err(|e| ParseError::Html(e.to_string()))?;
    Ok(unescape(&converted))
}

fn inline_text(element: Element) -> Option<String> {
    Some(element.content.to_string())
}

fn block_text(element: Element) -> Option<String> {
    Some(format!("\n\n{}\n\n", element.content.trim_matches('\n')))
}

fn list_item_text(element: Element) -> Option<String> {
    Some(format!(" * {}\n", element.content.trim()))
}

fn link_text(element: Element) -> Option<String> {
    let text = element.content.trim();
    let href = element
        .attrs
        .iter()
        .find(|attr| &*attr.name.local == "href")
        .map(|attr| attr.value.to_string())
        .filter(|href| !href.is_empty() && !href.starts_with('#'));

    match href {
        Some(href) if text.is_empty() => Some(href),
        Some(href) if href != text && href.trim_start_matches("mailto:") != text => {
            Some(format!("{text} [{href}]"))
        }
        _ => Some(text.to_string()),
    }
}

/// Text nodes come out of the converter Markdown-escaped; undo that so
/// `5*3` stays `5*3`.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// RFC 5322 field name: printable US-ASCII, no colon.
fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}

fn first_text_part(parsed: &Message) -> Option<String> {
    parsed.text_bodies().find_map(|part| match &part.body {
        PartType::Text(text) => Some(text.to_string()),
        _ => None,
    })
}

fn first_html_part(parsed: &Message) -> Option<String> {
    parsed.html_bodies().find_map(|part| match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "Date: Tue, 11 Mar 2025 20:54:05 +0000\n\
To: support@example.com\n\
From: First Last <sa@example-sender.com>\n\
Subject: Test Email\n\
MIME-Version: 1.0\n\
Content-Type: multipart/alternative; boundary=\"b1\"\n\
\n\
--b1\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
This is a test email message.\n\
\n\
--b1\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<html><body><p>This is the HTML version.</p></body></html>\n\
\n\
--b1--\n";

    const HTML_ONLY: &str = "Date: Fri, 21 Mar 2025 12:00:41 +0000\n\
From: alerts@opsgenie.net\n\
Subject: Alert\n\
MIME-Version: 1.0\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<html><body><p>Disk usage <b>critical</b> on db-1</p></body></html>\n";

    #[test]
    fn parse_multipart_fields() {
        let email = ParsedEmail::parse(Some(MULTIPART.as_bytes())).unwrap();
        assert_eq!(email.subject.as_deref(), Some("Test Email"));
        assert!(email.text.as_deref().unwrap().contains("This is a test email message."));
        assert!(email.html.as_deref().unwrap().contains("HTML version"));
        assert_eq!(email.date_display(), "2025-03-11T20:54:05.000Z");
    }

    #[test]
    fn plain_text_prefers_text_part() {
        let email = ParsedEmail::parse(Some(MULTIPART.as_bytes())).unwrap();
        assert_eq!(email.plain_text().unwrap(), "This is a test email message.");
    }

    #[test]
    fn plain_text_falls_back_to_html() {
        let email = ParsedEmail::parse(Some(HTML_ONLY.as_bytes())).unwrap();
        assert!(email.text.is_none());
        let text = email.plain_text().unwrap();
        assert!(text.contains("Disk usage"));
        assert!(text.contains("critical"));
        assert!(!text.contains("<p>"));
        assert!(!text.contains("**"));
    }

    #[test]
    fn date_is_normalized_to_utc() {
        let raw = "Date: Tue, 11 Mar 2025 13:54:05 -0700\nFrom: a@b.c\n\nhello\n";
        let email = ParsedEmail::parse(Some(raw.as_bytes())).unwrap();
        assert_eq!(email.date_display(), "2025-03-11T20:54:05.000Z");
    }

    #[test]
    fn missing_date_renders_unknown() {
        let raw = "From: a@b.c\nSubject: hi\n\nhello\n";
        let email = ParsedEmail::parse(Some(raw.as_bytes())).unwrap();
        assert!(email.date.is_none());
        assert_eq!(email.date_display(), "unknown");
    }

    #[test]
    fn absent_content_is_an_error() {
        assert!(matches!(
            ParsedEmail::parse(None),
            Err(ParseError::NoContent)
        ));
        assert!(matches!(
            ParsedEmail::parse(Some(&b""[..])),
            Err(ParseError::NoContent)
        ));
    }

    #[test]
    fn no_body_is_an_error() {
        let email = ParsedEmail {
            subject: Some("Empty".into()),
            ..Default::default()
        };
        assert!(matches!(email.plain_text(), Err(ParseError::NoBody)));
    }

    #[test]
    fn headerless_content_is_malformed() {
        assert!(matches!(
            ParsedEmail::parse(Some(&b"Invalid email content"[..])),
            Err(ParseError::Malformed)
        ));
        assert!(matches!(
            ParsedEmail::parse(Some(&b"Invalid email content\n\nstill not a message\n"[..])),
            Err(ParseError::Malformed)
        ));
    }

    #[test]
    fn html_to_text_strips_markup() {
        let text = html_to_text("<div>Hello <span>there</span></div>").unwrap();
        assert_eq!(text, "Hello there");
    }

    #[test]
    fn html_to_text_drops_head_and_style() {
        let html = "<html>\n<head>\n<title>Alert</title>\n<style>\n* {\nfont-family:Roboto;\n}\n</style>\n</head>\n<body>\nThis is a test email message.\n<script>track();</script>\n</body>\n</html>";
        let text = html_to_text(html).unwrap();
        assert_eq!(text.trim(), "This is a test email message.");
    }

    #[test]
    fn html_to_text_is_not_markdown() {
        let html = "<p>Disk <b>critical</b> see <a href=\"https://ex.com/a\">dashboard</a> &amp; <i>now</i></p><ul><li>one</li><li>two</li></ul><h1>Head</h1>";
        let text = html_to_text(html).unwrap();

        assert!(text.contains("Disk critical see dashboard [https://ex.com/a] & now"));
        assert!(text.contains(" * one\n * two"));
        assert!(text.contains("Head"));
        assert!(!text.contains("**"));
        assert!(!text.contains("]("));
        assert!(!text.contains("_now_"));
        assert!(!text.contains("# Head"));
    }

    #[test]
    fn html_to_text_keeps_literal_punctuation() {
        let text = html_to_text("<p>rate_limit 5*3 [draft] C:\\temp</p>").unwrap();
        assert_eq!(text, "rate_limit 5*3 [draft] C:\\temp");
    }

    #[test]
    fn html_only_message_with_style_block() {
        let raw = "From: alerts@opsgenie.net\n\
Subject: Alert\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<html><head><style>p { color: red; }</style></head>\
<body><p>Disk <b>critical</b> on <a href=\"https://status.example.com\">db-1</a></p></body></html>\n";
        let email = ParsedEmail::parse(Some(raw.as_bytes())).unwrap();
        let text = email.plain_text().unwrap();
        assert_eq!(text, "Disk critical on db-1 [https://status.example.com]");
    }
}
