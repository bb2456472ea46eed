//! OpenAI Chat Completions dialect <-> canonical conversion.
//!
//! OpenAI has no concept of a signed thinking block; any [`Part::Thinking`]
//! reaching this conversion is dropped rather than serialized, since the
//! wire format has no field for it and `llmux-thinking`'s gate keeps
//! thinking out of OpenAI-bound requests in the first place.

use llmux_core::part::{Message, Part, Role, ToolResultContent};
use serde_json::{Value, json};

/// Convert a canonical conversation into an OpenAI `messages` array.
#[must_use]
pub fn from_canonical(messages: &[Message]) -> Value {
    json!(messages.iter().map(message_to_wire).collect::<Vec<_>>())
}

fn message_to_wire(message: &Message) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };

    let tool_calls: Vec<Value> = message
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::ToolUse {
                id,
                name,
                arguments,
                ..
            } => Some(json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": arguments.to_string() },
            })),
            _ => None,
        })
        .collect();

    if let Some(Part::ToolResult {
        tool_use_id,
        content,
        ..
    }) = message.parts.iter().find(|p| matches!(p, Part::ToolResult { .. }))
    {
        return json!({
            "role": "tool",
            "tool_call_id": tool_use_id,
            "content": tool_result_text(content),
        });
    }

    let text: String = message
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    let mut obj = json!({ "role": role, "content": text });
    if !tool_calls.is_empty() {
        obj["tool_calls"] = json!(tool_calls);
    }
    obj
}

fn tool_result_text(content: &ToolResultContent) -> String {
    match content {
        ToolResultContent::Text(t) => t.clone(),
        ToolResultContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

/// Convert an OpenAI `messages` array into the canonical conversation tree.
#[must_use]
pub fn to_canonical(messages: &[Value]) -> Vec<Message> {
    messages
        .iter()
        .map(|wire| {
            let role = match wire.get("role").and_then(Value::as_str) {
                Some("assistant") => Role::Assistant,
                Some("system") => Role::System,
                Some("tool") => Role::User,
                _ => Role::User,
            };

            let mut parts = Vec::new();

            if wire.get("role").and_then(Value::as_str) == Some("tool") {
                let tool_use_id = wire
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let text = wire.get("content").and_then(Value::as_str).unwrap_or_default();
                parts.push(Part::ToolResult {
                    tool_use_id,
                    content: ToolResultContent::Text(text.to_string()),
                    is_error: false,
                });
                return Message { role, parts };
            }

            if let Some(text) = wire.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    parts.push(Part::Text { text: text.to_string() });
                }
            }

            if let Some(tool_calls) = wire.get("tool_calls").and_then(Value::as_array) {
                for call in tool_calls {
                    let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
                    let function = call.get("function");
                    let name = function
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let arguments = function
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str)
                        .and_then(|s| serde_json::from_str(s).ok())
                        .unwrap_or_else(|| json!({}));
                    parts.push(Part::ToolUse {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments,
                        thought_signature: None,
                    });
                }
            }

            Message { role, parts }
        })
        .collect()
}
