//! Gemini `generateContent` streaming chunk processing.
//!
//! Gemini sends full (not delta) part objects per chunk rather than
//! incremental deltas — a "thinking part" or "text part" appears once per
//! chunk carrying whatever text the model produced since the last chunk.

use crate::event::{StopReason, StreamEvent};
use crate::state::StreamState;
use serde_json::Value;

/// Process one decoded Gemini stream chunk (`{candidates, usageMetadata}`).
pub fn process_chunk(chunk: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(error) = chunk.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown Gemini stream error")
            .to_string();
        events.push(StreamEvent::Error { message });
        return events;
    }

    if let Some(usage) = chunk.get("usageMetadata") {
        state.input_tokens = usage
            .get("promptTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(state.input_tokens);
        state.output_tokens = usage
            .get("candidatesTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(state.output_tokens);
    }

    let Some(candidate) = chunk
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        return events;
    };

    if let Some(parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            events.extend(process_part(part, state));
        }
    }

    if let Some(finish_reason) = candidate.get("finishReason").and_then(Value::as_str) {
        events.extend(finish(finish_reason, state));
    }

    events
}

fn process_part(part: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(function_call) = part.get("functionCall") {
        let id = state.next_synthetic_tool_call_id();
        let name = function_call
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let arguments = function_call.get("args").cloned().unwrap_or(Value::Null);
        let thought_signature = part
            .as_object()
            .and_then(llmux_core::part::Part::extract_signature_field);

        events.push(StreamEvent::ToolCallStart {
            id: id.clone(),
            name: name.clone(),
        });
        events.push(StreamEvent::ToolCallDelta {
            id: id.clone(),
            arguments_delta: arguments.to_string(),
        });
        events.push(StreamEvent::ToolCallEnd {
            id,
            name,
            arguments,
            thought_signature,
        });
        state.any_tool_call = true;
        return events;
    }

    let Some(text) = part.get("text").and_then(Value::as_str) else {
        return events;
    };
    let is_thought = part.get("thought").and_then(Value::as_bool) == Some(true);

    if is_thought {
        if !state.thinking_started {
            events.push(StreamEvent::ThinkingStart);
            state.thinking_started = true;
        }
        state.accumulated_thinking.push_str(text);
        if let Some(sig) = part.as_object().and_then(llmux_core::part::Part::extract_signature_field) {
            state.thinking_signature = Some(sig);
        }
        events.push(StreamEvent::ThinkingDelta { delta: text.to_string() });
    } else {
        if state.thinking_started {
            events.push(StreamEvent::ThinkingEnd {
                thinking: state.accumulated_thinking.clone(),
                signature: state.thinking_signature.take(),
            });
            state.thinking_started = false;
        }
        if !state.text_started {
            events.push(StreamEvent::TextStart);
            state.text_started = true;
        }
        state.accumulated_text.push_str(text);
        events.push(StreamEvent::TextDelta { delta: text.to_string() });
    }

    events
}

fn finish(finish_reason: &str, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if state.thinking_started {
        events.push(StreamEvent::ThinkingEnd {
            thinking: state.accumulated_thinking.clone(),
            signature: state.thinking_signature.take(),
        });
        state.thinking_started = false;
    }
    if state.text_started {
        events.push(StreamEvent::TextEnd);
        state.text_started = false;
    }

    let stop_reason = match finish_reason {
        "STOP" if state.any_tool_call => StopReason::ToolUse,
        "STOP" => StopReason::EndTurn,
        "MAX_TOKENS" => StopReason::MaxTokens,
        "SAFETY" | "RECITATION" => StopReason::ContentFilter,
        _ => StopReason::Other("unknown"),
    };
    events.push(StreamEvent::Usage {
        input_tokens: state.input_tokens,
        output_tokens: state.output_tokens,
    });
    events.push(StreamEvent::Done { stop_reason });

    events
}
