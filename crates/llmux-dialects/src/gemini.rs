//! Google Gemini `generateContent` dialect <-> canonical conversion.

use llmux_core::part::{Message, Part, Role, ToolResultContent};
use serde_json::{Value, json};

/// Convert a canonical conversation into a Gemini `{systemInstruction,
/// contents}` pair.
#[must_use]
pub fn from_canonical(messages: &[Message]) -> (Option<Value>, Value) {
    let system_texts: Vec<&str> = messages
        .iter()
        .filter(|m| matches!(m.role, Role::System))
        .flat_map(|m| &m.parts)
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let system = (!system_texts.is_empty())
        .then(|| json!({ "parts": [{ "text": system_texts.join("\n\n") }] }));

    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| !matches!(m.role, Role::System))
        .map(message_to_wire)
        .collect();

    (system, json!(contents))
}

fn message_to_wire(message: &Message) -> Value {
    let role = match message.role {
        Role::Assistant => "model",
        _ => "user",
    };
    let parts: Vec<Value> = message.parts.iter().map(part_to_wire).collect();
    json!({ "role": role, "parts": parts })
}

fn part_to_wire(part: &Part) -> Value {
    match part {
        Part::Text { text } => json!({ "text": text }),
        Part::Thinking { text, signature } => {
            let mut v = json!({ "text": text, "thought": true });
            if let Some(sig) = signature {
                v["thoughtSignature"] = json!(sig);
            }
            v
        }
        Part::ToolUse {
            name,
            arguments,
            thought_signature,
            ..
        } => {
            let mut v = json!({ "functionCall": { "name": name, "args": arguments } });
            if let Some(sig) = thought_signature {
                v["thoughtSignature"] = json!(sig);
            }
            v
        }
        Part::ToolResult {
            tool_use_id,
            content,
            ..
        } => json!({
            "functionResponse": {
                "name": tool_use_id,
                "response": { "result": tool_result_to_value(content) },
            }
        }),
        Part::Other { raw } => raw.clone(),
    }
}

fn tool_result_to_value(content: &ToolResultContent) -> Value {
    match content {
        ToolResultContent::Text(t) => json!(t),
        ToolResultContent::Parts(parts) => json!(
            parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("")
        ),
    }
}

/// Convert Gemini `{systemInstruction, contents}` into the canonical
/// conversation tree. Tool-call ids are synthesized (Gemini function calls
/// don't carry one) as `"call_{index}"`, matching the index order they were
/// seen in.
#[must_use]
pub fn to_canonical(system_instruction: Option<&Value>, contents: &[Value]) -> Vec<Message> {
    let mut out = Vec::new();

    if let Some(sys) = system_instruction {
        let text = sys
            .get("parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
            .unwrap_or_default();
        if !text.is_empty() {
            out.push(Message::text(Role::System, text));
        }
    }

    let mut call_index = 0usize;
    for wire in contents {
        let role = match wire.get("role").and_then(Value::as_str) {
            Some("model") => Role::Assistant,
            _ => Role::User,
        };
        let parts = wire
            .get("parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| wire_part_to_canonical(p, &mut call_index))
                    .collect()
            })
            .unwrap_or_default();
        out.push(Message { role, parts });
    }

    out
}

fn wire_part_to_canonical(part: &Value, call_index: &mut usize) -> Option<Part> {
    if let Some(obj) = part.as_object() {
        if let Some(true) = obj.get("thought").and_then(Value::as_bool) {
            return Some(Part::Thinking {
                text: obj.get("text").and_then(Value::as_str).unwrap_or("").to_string(),
                signature: Part::extract_signature_field(obj),
            });
        }
        if let Some(fc) = obj.get("functionCall") {
            let id = format!("call_{call_index}");
            *call_index += 1;
            return Some(Part::ToolUse {
                id,
                name: fc.get("name")?.as_str()?.to_string(),
                arguments: fc.get("args").cloned().unwrap_or(json!({})),
                thought_signature: Part::extract_signature_field(obj),
            });
        }
        if let Some(fr) = obj.get("functionResponse") {
            let name = fr.get("name").and_then(Value::as_str).unwrap_or_default();
            let text = fr
                .get("response")
                .and_then(|r| r.get("result"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Some(Part::ToolResult {
                tool_use_id: name.to_string(),
                content: ToolResultContent::Text(text.to_string()),
                is_error: false,
            });
        }
        if let Some(text) = obj.get("text").and_then(Value::as_str) {
            return Some(Part::Text { text: text.to_string() });
        }
    }
    Some(Part::Other { raw: part.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_part_carries_thought_flag_and_signature() {
        let messages = vec![Message {
            role: Role::Assistant,
            parts: vec![Part::Thinking {
                text: "reasoning".into(),
                signature: Some("sig".into()),
            }],
        }];
        let (_, contents) = from_canonical(&messages);
        let part = &contents[0]["parts"][0];
        assert_eq!(part["thought"], true);
        assert_eq!(part["thoughtSignature"], "sig");
    }

    #[test]
    fn function_call_synthesizes_sequential_ids() {
        let wire = json!([
            { "role": "model", "parts": [
                { "functionCall": { "name": "search", "args": {} } }
            ]},
        ]);
        let canonical = to_canonical(None, wire.as_array().unwrap());
        assert_eq!(
            canonical[0].parts[0],
            Part::ToolUse {
                id: "call_0".into(),
                name: "search".into(),
                arguments: json!({}),
                thought_signature: None,
            }
        );
    }

    #[test]
    fn assistant_role_maps_to_model_on_wire() {
        let messages = vec![Message::text(Role::Assistant, "hi")];
        let (_, contents) = from_canonical(&messages);
        assert_eq!(contents[0]["role"], "model");
    }

    #[test]
    fn system_instruction_round_trips() {
        let canonical = to_canonical(
            Some(&json!({ "parts": [{ "text": "be terse" }] })),
            &[],
        );
        assert_eq!(canonical[0].role, Role::System);
        let (system, _) = from_canonical(&canonical);
        assert_eq!(system.unwrap()["parts"][0]["text"], "be terse");
    }
}
