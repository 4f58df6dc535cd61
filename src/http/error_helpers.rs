//! Helpers for reading error payloads and formatting diagnostic context.

use serde_json::Value;

/// Maximum characters to include from a body in diagnostic messages
const BODY_PREVIEW_LENGTH: usize = 200;

/// Extracts the server-provided message from an error payload.
///
/// Looks at `message`, then `error`. Blank strings count as absent.
pub fn server_message(payload: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// Wraps a non-JSON body the same way a JSON error would look.
pub fn wrap_text_body(text: &str) -> Value {
    serde_json::json!({ "message": text })
}

/// Interprets raw bytes as an error payload: JSON when it parses, the
/// wrapped text otherwise.
pub fn payload_from_bytes(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| wrap_text_body(&String::from_utf8_lossy(bytes)))
}

/// Short preview of a body or line for log messages.
pub fn preview(s: &str) -> String {
    truncate_for_context(s, BODY_PREVIEW_LENGTH)
}

/// Truncates a string to specified length, adding "..." if truncated.
///
/// Slices on a character boundary so multi-byte UTF-8 never panics.
fn truncate_for_context(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let truncate_at = s
            .char_indices()
            .take_while(|(i, c)| i + c.len_utf8() <= max_len)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &s[..truncate_at])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_message_prefers_message() {
        let payload = json!({"message": "Bad password", "error": "AUTH"});
        assert_eq!(server_message(&payload).as_deref(), Some("Bad password"));
    }

    #[test]
    fn test_server_message_falls_back_to_error() {
        let payload = json!({"success": false, "error": "Brief closed"});
        assert_eq!(server_message(&payload).as_deref(), Some("Brief closed"));
    }

    #[test]
    fn test_server_message_blank_is_none() {
        assert_eq!(server_message(&json!({"message": "   "})), None);
        assert_eq!(server_message(&json!({"message": 42})), None);
        assert_eq!(server_message(&json!([])), None);
    }

    #[test]
    fn test_payload_from_bytes_json() {
        let payload = payload_from_bytes(br#"{"message":"quota exceeded"}"#);
        assert_eq!(payload["message"], "quota exceeded");
    }

    #[test]
    fn test_payload_from_bytes_text() {
        let payload = payload_from_bytes(b"Gateway Timeout");
        assert_eq!(payload, json!({"message": "Gateway Timeout"}));
    }

    #[test]
    fn test_truncate_for_context_short_string() {
        assert_eq!(truncate_for_context("Short", 100), "Short");
    }

    #[test]
    fn test_truncate_for_context_long_string() {
        let result = preview(&"a".repeat(300));
        assert_eq!(result.len(), 203);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_for_context_utf8_boundary() {
        let emoji_str = "x".repeat(198) + "🎉"; // 202 bytes
        let result = truncate_for_context(&emoji_str, 200);

        assert_eq!(result.len(), 201);
        assert!(!result.contains("🎉"));
    }

    #[test]
    fn test_truncate_for_context_exactly_at_boundary() {
        let exact = "a".repeat(200);
        assert_eq!(truncate_for_context(&exact, 200), exact);
    }
}
