//! Dialect <-> dialect request conversion (C8 RequestTransform).
//!
//! Every wire dialect converts to and from [`llmux_core::part`]'s canonical
//! conversation tree; [`transform_request`] is the seam the dispatcher calls
//! to go directly from one dialect's request body to another's.

pub mod anthropic;
pub mod fixups;
pub mod gemini;
pub mod openai;

use llmux_core::part::{Message, Part};
use llmux_core::Dialect;
use serde_json::{Value, json};

/// Parameters accompanying a [`transform_request`] call.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Destination model name, substituted into the transformed body.
    pub model: Option<String>,
    /// Force thinking on/off regardless of what the source body asked for.
    pub thinking_override: Option<bool>,
}

/// Parse `body` as `from`'s wire dialect, convert to the canonical tree, then
/// re-emit as `to`'s wire dialect. Pure function: no I/O, no side effects.
#[must_use]
pub fn transform_request(
    body: &Value,
    from: Dialect,
    to: Dialect,
    options: &TransformOptions,
) -> Value {
    let messages = parse_dialect(body, from);
    let mut out = emit_dialect(&messages, to, body);

    if let Some(model) = &options.model {
        if let Some(obj) = out.as_object_mut() {
            obj.insert("model".to_string(), json!(model));
        }
    }

    if options.thinking_override == Some(false) {
        strip_unsigned_thinking_requests(&mut out, to);
    }

    out
}

fn parse_dialect(body: &Value, dialect: Dialect) -> Vec<Message> {
    match dialect {
        Dialect::AnthropicMessages => {
            let system = body.get("system");
            let messages = body
                .get("messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            anthropic::to_canonical(system, &messages)
        }
        Dialect::OpenaiChat => {
            let messages = body
                .get("messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            openai::to_canonical(&messages)
        }
        Dialect::GeminiGenerateContent => {
            let system = body.get("systemInstruction");
            let contents = body
                .get("contents")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            gemini::to_canonical(system, &contents)
        }
    }
}

fn emit_dialect(messages: &[Message], dialect: Dialect, source_body: &Value) -> Value {
    match dialect {
        Dialect::AnthropicMessages => {
            let (system, wire_messages) = anthropic::from_canonical(messages);
            let mut obj = source_body.clone();
            if let Some(obj_map) = obj.as_object_mut() {
                obj_map.insert("messages".to_string(), wire_messages);
                match system {
                    Some(s) => {
                        obj_map.insert("system".to_string(), s);
                    }
                    None => {
                        obj_map.remove("system");
                    }
                }
                obj_map.remove("contents");
                obj_map.remove("systemInstruction");
            }
            obj
        }
        Dialect::OpenaiChat => {
            let wire_messages = openai::from_canonical(messages);
            let mut obj = source_body.clone();
            if let Some(obj_map) = obj.as_object_mut() {
                obj_map.insert("messages".to_string(), wire_messages);
                obj_map.remove("system");
                obj_map.remove("contents");
                obj_map.remove("systemInstruction");
            }
            obj
        }
        Dialect::GeminiGenerateContent => {
            let (system, contents) = gemini::from_canonical(messages);
            let mut obj = source_body.clone();
            if let Some(obj_map) = obj.as_object_mut() {
                obj_map.insert("contents".to_string(), contents);
                match system {
                    Some(s) => {
                        obj_map.insert("systemInstruction".to_string(), s);
                    }
                    None => {
                        obj_map.remove("systemInstruction");
                    }
                }
                obj_map.remove("messages");
                obj_map.remove("system");
            }
            obj
        }
    }
}

/// When thinking has been force-disabled, drop any signed thinking block
/// that would otherwise still be emitted (Anthropic/Gemini only emit signed
/// ones anyway; this covers the case where the caller wants it gone
/// entirely regardless of signature).
fn strip_unsigned_thinking_requests(body: &mut Value, dialect: Dialect) {
    match dialect {
        Dialect::AnthropicMessages => {
            if let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) {
                for message in messages {
                    if let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) {
                        content.retain(|block| block.get("type").and_then(Value::as_str) != Some("thinking"));
                    }
                }
            }
        }
        Dialect::GeminiGenerateContent => {
            if let Some(contents) = body.get_mut("contents").and_then(Value::as_array_mut) {
                for entry in contents {
                    if let Some(parts) = entry.get_mut("parts").and_then(Value::as_array_mut) {
                        parts.retain(|part| part.get("thought").and_then(Value::as_bool) != Some(true));
                    }
                }
            }
        }
        Dialect::OpenaiChat => {}
    }
}

/// Count trailing messages carrying at least one tool-result part, matching
/// the "count of messages with a tool-result part" convention resolved for
/// the turn-separation recovery heuristic (see DESIGN.md Open Questions).
#[must_use]
pub fn count_trailing_tool_results(messages: &[Message]) -> usize {
    messages
        .iter()
        .rev()
        .take_while(|m| m.has_tool_result())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anthropic_to_openai_transform_preserves_text() {
        let body = json!({
            "model": "claude-opus-4",
            "system": "be terse",
            "messages": [{ "role": "user", "content": [{ "type": "text", "text": "hi" }] }],
        });
        let out = transform_request(
            &body,
            Dialect::AnthropicMessages,
            Dialect::OpenaiChat,
            &TransformOptions::default(),
        );
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be terse");
        assert_eq!(messages[1]["content"], "hi");
    }

    #[test]
    fn model_override_is_applied() {
        let body = json!({ "model": "gpt-4o", "messages": [] });
        let options = TransformOptions {
            model: Some("gpt-5".to_string()),
            thinking_override: None,
        };
        let out = transform_request(&body, Dialect::OpenaiChat, Dialect::OpenaiChat, &options);
        assert_eq!(out["model"], "gpt-5");
    }

    #[test]
    fn thinking_override_false_strips_signed_anthropic_thinking() {
        let body = json!({
            "model": "claude-opus-4",
            "messages": [{ "role": "assistant", "content": [
                { "type": "thinking", "thinking": "r", "signature": "sig" },
                { "type": "text", "text": "hi" },
            ]}],
        });
        let options = TransformOptions {
            model: None,
            thinking_override: Some(false),
        };
        let out = transform_request(&body, Dialect::AnthropicMessages, Dialect::AnthropicMessages, &options);
        let content = out["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "text");
    }

    #[test]
    fn count_trailing_tool_results_counts_only_the_trailing_run() {
        let messages = vec![
            Message::text(llmux_core::part::Role::User, "hi"),
            Message {
                role: llmux_core::part::Role::User,
                parts: vec![Part::ToolResult {
                    tool_use_id: "t1".into(),
                    content: llmux_core::part::ToolResultContent::Text("ok".into()),
                    is_error: false,
                }],
            },
            Message {
                role: llmux_core::part::Role::User,
                parts: vec![Part::ToolResult {
                    tool_use_id: "t2".into(),
                    content: llmux_core::part::ToolResultContent::Text("ok".into()),
                    is_error: false,
                }],
            },
        ];
        assert_eq!(count_trailing_tool_results(&messages), 2);
    }
}
