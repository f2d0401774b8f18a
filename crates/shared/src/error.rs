//! Failure side of the submit contract. Anything the service sends with a
//! non-success response is untrusted text and must be reduced to plain
//! printable data before it reaches a user-facing surface.

use serde::Deserialize;

/// Failure envelope attached to rejected submissions:
/// `{"success": false, "error": "..."}`. The `message` key covers proxies
/// and gateways answering in front of the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectionBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Extract a displayable message from a raw failure body. JSON envelopes
/// are unwrapped, anything else is taken as plain text, and the result is
/// passed through [`printable_message`]. `None` when nothing printable
/// remains, in which case callers fall back to their local default.
pub fn rejection_message(body: &str) -> Option<String> {
    let text = match serde_json::from_str::<RejectionBody>(body) {
        Ok(envelope) => envelope.error.or(envelope.message)?,
        Err(_) => body.to_string(),
    };
    printable_message(&text)
}

/// Reduce untrusted text to something safe to render: control characters
/// (terminal escapes included) become spaces, whitespace runs collapse,
/// ends are trimmed.
pub fn printable_message(raw: &str) -> Option<String> {
    let mut cleaned = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.chars() {
        if c.is_control() || c.is_whitespace() {
            pending_space = !cleaned.is_empty();
            continue;
        }
        if pending_space {
            cleaned.push(' ');
            pending_space = false;
        }
        cleaned.push(c);
    }
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_service_error_envelope() {
        let body = r#"{"success": false, "error": "Unexpected error: invalid archive"}"#;
        assert_eq!(
            rejection_message(body).as_deref(),
            Some("Unexpected error: invalid archive")
        );
    }

    #[test]
    fn falls_back_to_plain_text_bodies() {
        assert_eq!(
            rejection_message("upstream unavailable").as_deref(),
            Some("upstream unavailable")
        );
    }

    #[test]
    fn envelope_without_message_yields_none() {
        assert_eq!(rejection_message(r#"{"success": false}"#), None);
        assert_eq!(rejection_message(""), None);
    }

    #[test]
    fn strips_terminal_escapes_from_untrusted_text() {
        let hostile = "\x1b[2Jrejected\x07\r\n  by  scanner\x1b[0m";
        assert_eq!(
            printable_message(hostile).as_deref(),
            Some("[2Jrejected by scanner [0m")
        );
    }
}
