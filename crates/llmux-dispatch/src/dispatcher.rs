//! Pure request-shape inspection used by the HTTP entry point (C11).
//!
//! These functions never touch I/O; the actual HTTP handler
//! (`llmux-server`) calls them to decide how to route a request before
//! handing it to the retry driver.

use llmux_core::Dialect;
use serde_json::Value;

/// Extract the requested model name, preferring a `models/<name>` path
/// segment (Gemini-style) over the request body's `model` field.
#[must_use]
pub fn extract_model(path: &str, body: &Value) -> Option<String> {
    if let Some(from_path) = extract_model_from_path(path) {
        return Some(from_path);
    }
    body.get("model").and_then(Value::as_str).map(str::to_string)
}

/// Parse a Gemini-style `.../models/<name>:<action>` or `.../models/<name>`
/// path segment.
#[must_use]
pub fn extract_model_from_path(path: &str) -> Option<String> {
    let (_, after) = path.split_once("models/")?;
    let name = after.split('/').next().unwrap_or(after);
    let name = name.split(':').next().unwrap_or(name);
    (!name.is_empty()).then(|| name.to_string())
}

/// Detect the inbound wire dialect from the request path, falling back to
/// inspecting the body shape when the path is ambiguous (provider-scoped
/// passthrough routes).
#[must_use]
pub fn detect_dialect(path: &str, body: &Value) -> Dialect {
    if path.contains("/v1/messages") {
        return Dialect::AnthropicMessages;
    }
    if path.contains("/v1/chat/completions") {
        return Dialect::OpenaiChat;
    }
    if path.contains("generateContent") || path.contains("streamGenerateContent") {
        return Dialect::GeminiGenerateContent;
    }
    if path.contains("/v1/responses") {
        return Dialect::OpenaiChat;
    }
    detect_dialect_from_body(body)
}

fn detect_dialect_from_body(body: &Value) -> Dialect {
    if body.get("contents").is_some() {
        Dialect::GeminiGenerateContent
    } else if body.get("system").is_some()
        || body
            .get("messages")
            .and_then(Value::as_array)
            .is_some_and(|m| m.iter().any(|msg| msg.get("content").is_some_and(Value::is_array)))
    {
        Dialect::AnthropicMessages
    } else {
        Dialect::OpenaiChat
    }
}

/// Whether the request body asks for a streaming response.
#[must_use]
pub fn wants_streaming(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_path_segment_strips_trailing_action() {
        assert_eq!(
            extract_model_from_path("/v1beta/models/gemini-1.5-pro:streamGenerateContent"),
            Some("gemini-1.5-pro".to_string())
        );
    }

    #[test]
    fn model_falls_back_to_body_when_no_path_segment() {
        let body = json!({ "model": "gpt-4o" });
        assert_eq!(extract_model("/v1/chat/completions", &body), Some("gpt-4o".to_string()));
    }

    #[test]
    fn dialect_detected_from_path() {
        assert_eq!(detect_dialect("/v1/messages", &json!({})), Dialect::AnthropicMessages);
        assert_eq!(detect_dialect("/v1/chat/completions", &json!({})), Dialect::OpenaiChat);
        assert_eq!(
            detect_dialect("/v1beta/models/gemini-pro:generateContent", &json!({})),
            Dialect::GeminiGenerateContent
        );
    }

    #[test]
    fn dialect_detected_from_body_shape_on_ambiguous_path() {
        let body = json!({ "contents": [] });
        assert_eq!(
            detect_dialect("/api/provider/gemini/v1beta/models/x", &body),
            Dialect::GeminiGenerateContent
        );
    }

    #[test]
    fn streaming_flag_defaults_to_false() {
        assert!(!wants_streaming(&json!({})));
        assert!(wants_streaming(&json!({ "stream": true })));
    }
}
