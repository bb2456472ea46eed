//! Anthropic Messages dialect <-> canonical conversion.
//!
//! Thinking blocks are only emitted to the wire when they carry a
//! signature — an unsigned thinking block is not valid Anthropic input and
//! must have already been stripped by `llmux-thinking` upstream of this
//! conversion.

use llmux_core::part::{Message, Part, Role, ToolResultContent};
use serde_json::{Value, json};

/// Convert a canonical conversation into an Anthropic Messages API body's
/// `system` and `messages` fields.
#[must_use]
pub fn from_canonical(messages: &[Message]) -> (Option<Value>, Value) {
    let system_texts: Vec<&str> = messages
        .iter()
        .filter(|m| matches!(m.role, Role::System))
        .flat_map(|m| m.parts.iter())
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let system = (!system_texts.is_empty()).then(|| json!(system_texts.join("\n\n")));

    let wire_messages: Vec<Value> = messages
        .iter()
        .filter(|m| !matches!(m.role, Role::System))
        .map(message_to_wire)
        .collect();

    (system, json!(wire_messages))
}

fn message_to_wire(message: &Message) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => unreachable!("system messages filtered before this point"),
    };
    let content: Vec<Value> = message.parts.iter().filter_map(part_to_wire).collect();
    json!({ "role": role, "content": content })
}

fn part_to_wire(part: &Part) -> Option<Value> {
    match part {
        Part::Text { text } => Some(json!({ "type": "text", "text": text })),
        Part::Thinking {
            text,
            signature: Some(signature),
        } => Some(json!({ "type": "thinking", "thinking": text, "signature": signature })),
        Part::Thinking { signature: None, .. } => None,
        Part::ToolUse {
            id,
            name,
            arguments,
            ..
        } => Some(json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": arguments,
        })),
        Part::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": tool_result_content_to_wire(content),
            "is_error": is_error,
        })),
        Part::Other { raw } => Some(raw.clone()),
    }
}

fn tool_result_content_to_wire(content: &ToolResultContent) -> Value {
    match content {
        ToolResultContent::Text(text) => json!(text),
        ToolResultContent::Parts(parts) => {
            json!(parts.iter().filter_map(part_to_wire).collect::<Vec<_>>())
        }
    }
}

/// Convert an Anthropic Messages API body (`system` + `messages`) into the
/// canonical conversation tree.
#[must_use]
pub fn to_canonical(system: Option<&Value>, messages: &[Value]) -> Vec<Message> {
    let mut out = Vec::new();

    if let Some(system) = system {
        let text = match system {
            Value::String(s) => s.clone(),
            Value::Array(blocks) => blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n\n"),
            _ => String::new(),
        };
        if !text.is_empty() {
            out.push(Message::text(Role::System, text));
        }
    }

    for wire in messages {
        let role = match wire.get("role").and_then(Value::as_str) {
            Some("assistant") => Role::Assistant,
            _ => Role::User,
        };
        let parts = match wire.get("content") {
            Some(Value::String(s)) => vec![Part::Text { text: s.clone() }],
            Some(Value::Array(blocks)) => blocks.iter().filter_map(wire_part_to_canonical).collect(),
            _ => Vec::new(),
        };
        out.push(Message { role, parts });
    }

    out
}

fn wire_part_to_canonical(block: &Value) -> Option<Part> {
    let ty = block.get("type").and_then(Value::as_str)?;
    match ty {
        "text" => Some(Part::Text {
            text: block.get("text")?.as_str()?.to_string(),
        }),
        "thinking" => {
            let text = block.get("thinking").and_then(Value::as_str).unwrap_or("").to_string();
            let signature = block
                .as_object()
                .and_then(Part::extract_signature_field);
            Some(Part::Thinking { text, signature })
        }
        "tool_use" => Some(Part::ToolUse {
            id: block.get("id")?.as_str()?.to_string(),
            name: block.get("name")?.as_str()?.to_string(),
            arguments: block.get("input").cloned().unwrap_or(json!({})),
            thought_signature: block.as_object().and_then(Part::extract_signature_field),
        }),
        "tool_result" => {
            let content = match block.get("content") {
                Some(Value::String(s)) => ToolResultContent::Text(s.clone()),
                Some(Value::Array(arr)) => ToolResultContent::Parts(
                    arr.iter().filter_map(wire_part_to_canonical).collect(),
                ),
                _ => ToolResultContent::Text(String::new()),
            };
            Some(Part::ToolResult {
                tool_use_id: block.get("tool_use_id")?.as_str()?.to_string(),
                content,
                is_error: block
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        }
        _ => Some(Part::Other { raw: block.clone() }),
    }
}

/// Patch `stop_reason` from `"end_turn"` to `"tool_use"` when the assistant
/// message produced at least one tool-use content block — the wire-level
/// equivalent of the spec's stop-reason patch testable property, applied
/// directly to a constructed Messages-API response body.
pub fn patch_stop_reason(stop_reason: &mut String, assistant_content: &[Value]) {
    if stop_reason == "end_turn"
        && assistant_content
            .iter()
            .any(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
    {
        *stop_reason = "tool_use".to_string();
    }
}
