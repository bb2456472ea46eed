//! Anthropic Messages streaming event processing.
//!
//! Anthropic names its SSE event on a separate `event:` line; by the time a
//! frame reaches this module the caller has already paired that name with
//! the `data:` JSON payload.

use crate::event::{StopReason, StreamEvent};
use crate::state::{StreamState, ToolCallAccumulator};
use serde_json::Value;

/// Process one named Anthropic SSE event (`event_type`, decoded `data`
/// payload).
pub fn process_event(event_type: &str, data: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    match event_type {
        "content_block_start" => content_block_start(data, state),
        "content_block_delta" => content_block_delta(data, state),
        "content_block_stop" => content_block_stop(data, state),
        "message_delta" => message_delta(data, state),
        "message_stop" => vec![],
        "error" => vec![StreamEvent::Error {
            message: data
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown Anthropic stream error")
                .to_string(),
        }],
        _ => vec![],
    }
}

fn content_block_start(data: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    let Some(index) = data.get("index").and_then(Value::as_u64) else {
        return vec![];
    };
    let index = index as u32;
    let Some(block) = data.get("content_block") else {
        return vec![];
    };
    match block.get("type").and_then(Value::as_str) {
        Some("text") => {
            state.text_started = true;
            vec![StreamEvent::TextStart]
        }
        Some("thinking") => {
            state.thinking_started = true;
            vec![StreamEvent::ThinkingStart]
        }
        Some("tool_use") => {
            let id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            let name = block
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            state.tool_calls.insert(
                index,
                ToolCallAccumulator {
                    id: id.clone(),
                    name: name.clone(),
                    arguments_json: String::new(),
                    thought_signature: None,
                },
            );
            state.any_tool_call = true;
            vec![StreamEvent::ToolCallStart { id, name }]
        }
        _ => vec![],
    }
}

fn content_block_delta(data: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    let Some(index) = data.get("index").and_then(Value::as_u64) else {
        return vec![];
    };
    let index = index as u32;
    let Some(delta) = data.get("delta") else {
        return vec![];
    };

    match delta.get("type").and_then(Value::as_str) {
        Some("text_delta") => {
            let text = delta.get("text").and_then(Value::as_str).unwrap_or_default();
            state.accumulated_text.push_str(text);
            vec![StreamEvent::TextDelta { delta: text.to_string() }]
        }
        Some("thinking_delta") => {
            let text = delta.get("thinking").and_then(Value::as_str).unwrap_or_default();
            state.accumulated_thinking.push_str(text);
            vec![StreamEvent::ThinkingDelta { delta: text.to_string() }]
        }
        Some("signature_delta") => {
            let sig = delta.get("signature").and_then(Value::as_str).unwrap_or_default();
            state.thinking_signature = Some(sig.to_string());
            vec![]
        }
        Some("input_json_delta") => {
            let partial = delta.get("partial_json").and_then(Value::as_str).unwrap_or_default();
            if let Some(acc) = state.tool_calls.get_mut(&index) {
                acc.arguments_json.push_str(partial);
                vec![StreamEvent::ToolCallDelta {
                    id: acc.id.clone(),
                    arguments_delta: partial.to_string(),
                }]
            } else {
                vec![]
            }
        }
        _ => vec![],
    }
}

fn content_block_stop(data: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    let Some(index) = data.get("index").and_then(Value::as_u64) else {
        return vec![];
    };
    let index = index as u32;

    if state.thinking_started {
        state.thinking_started = false;
        return vec![StreamEvent::ThinkingEnd {
            thinking: std::mem::take(&mut state.accumulated_thinking),
            signature: state.thinking_signature.take(),
        }];
    }
    if state.text_started {
        state.text_started = false;
        return vec![StreamEvent::TextEnd];
    }
    if let Some(acc) = state.tool_calls.remove(&index) {
        let arguments = serde_json::from_str(&acc.arguments_json).unwrap_or(Value::Object(Default::default()));
        return vec![StreamEvent::ToolCallEnd {
            id: acc.id,
            name: acc.name,
            arguments,
            thought_signature: acc.thought_signature,
        }];
    }
    vec![]
}

fn message_delta(data: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(usage) = data.get("usage") {
        state.output_tokens = usage
            .get("output_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(state.output_tokens);
    }

    if let Some(mut stop_reason) = data
        .get("delta")
        .and_then(|d| d.get("stop_reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
    {
        if stop_reason == "end_turn" && state.any_tool_call {
            stop_reason = "tool_use".to_string();
        }
        let canonical = match stop_reason.as_str() {
            "end_turn" | "stop_sequence" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            _ => StopReason::Other("unknown"),
        };
        events.push(StreamEvent::Usage {
            input_tokens: state.input_tokens,
            output_tokens: state.output_tokens,
        });
        events.push(StreamEvent::Done { stop_reason: canonical });
    }

    events
}
