//! Session-key and conversation-key derivation.

use llmux_core::hash::seed_conversation_key;
use serde_json::Value;

/// Build the signature session key:
/// `"{server_session_id}:{model}:{project_key|default}:{conv_key|default}"`.
#[must_use]
pub fn build_signature_session_key(
    server_session_id: &str,
    model: &str,
    project_key: Option<&str>,
    conv_key: Option<&str>,
) -> String {
    format!(
        "{server_session_id}:{}:{}:{}",
        model.to_lowercase(),
        project_key.unwrap_or("default"),
        conv_key.unwrap_or("default"),
    )
}

/// Extract a conversation-scoping key from an inbound request payload,
/// trying a set of known field aliases in order, falling back to a
/// content-seeded key derived from system + first user text.
#[must_use]
pub fn extract_conversation_key(
    payload: &Value,
    system_text: &str,
    first_user_text: &str,
) -> Option<String> {
    let direct_fields = [
        "conversationId",
        "conversation_id",
        "thread_id",
        "threadId",
        "chat_id",
        "chatId",
        "sessionId",
        "session_id",
    ];
    for field in direct_fields {
        if let Some(Value::String(s)) = payload.get(field) {
            return Some(s.clone());
        }
    }

    if let Some(metadata) = payload.get("metadata") {
        for field in ["conversation_id", "conversationId"] {
            if let Some(Value::String(s)) = metadata.get(field) {
                return Some(s.clone());
            }
        }
    }

    if system_text.is_empty() && first_user_text.is_empty() {
        return None;
    }
    Some(seed_conversation_key(system_text, first_user_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_key_uses_default_placeholders_when_keys_absent() {
        let key = build_signature_session_key("srv1", "Claude-3-5-Sonnet", None, None);
        assert_eq!(key, "srv1:claude-3-5-sonnet:default:default");
    }

    #[test]
    fn direct_field_takes_priority() {
        let payload = json!({ "conversationId": "abc" });
        let key = extract_conversation_key(&payload, "sys", "first").unwrap();
        assert_eq!(key, "abc");
    }

    #[test]
    fn falls_back_through_aliases_in_order() {
        let payload = json!({ "thread_id": "t1" });
        assert_eq!(
            extract_conversation_key(&payload, "", "").unwrap(),
            "t1".to_string()
        );
    }

    #[test]
    fn metadata_nested_field_is_checked() {
        let payload = json!({ "metadata": { "conversation_id": "m1" } });
        assert_eq!(extract_conversation_key(&payload, "", "").unwrap(), "m1");
    }

    #[test]
    fn no_fields_and_no_text_yields_none() {
        let payload = json!({});
        assert!(extract_conversation_key(&payload, "", "").is_none());
    }

    #[test]
    fn no_fields_falls_back_to_seeded_key() {
        let payload = json!({});
        let key = extract_conversation_key(&payload, "sys", "first").unwrap();
        assert!(key.starts_with("seed-"));
    }
}
