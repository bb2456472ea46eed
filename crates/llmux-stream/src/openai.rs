//! OpenAI Chat Completions streaming chunk processing.
//!
//! OpenAI has no thinking wire representation, so this module never emits
//! `ThinkingStart`/`ThinkingDelta`/`ThinkingEnd`.

use crate::event::{StopReason, StreamEvent};
use crate::state::{StreamState, ToolCallAccumulator};
use serde_json::Value;

/// Process one decoded OpenAI chat-completion chunk
/// (`{choices: [{delta, finish_reason}], usage}`).
pub fn process_chunk(chunk: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(usage) = chunk.get("usage") {
        state.input_tokens = usage
            .get("prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(state.input_tokens);
        state.output_tokens = usage
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(state.output_tokens);
    }

    let Some(choice) = chunk.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
        return events;
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            if !content.is_empty() {
                if !state.text_started {
                    events.push(StreamEvent::TextStart);
                    state.text_started = true;
                }
                state.accumulated_text.push_str(content);
                events.push(StreamEvent::TextDelta { delta: content.to_string() });
            }
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in tool_calls {
                events.extend(process_tool_call_delta(call, state));
            }
        }
    }

    if let Some(finish_reason) = choice.get("finish_reason").and_then(Value::as_str) {
        events.extend(finish(finish_reason, state));
    }

    events
}

fn process_tool_call_delta(call: &Value, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let Some(index) = call.get("index").and_then(Value::as_u64) else {
        return events;
    };
    let index = index as u32;

    let is_new = !state.tool_calls.contains_key(&index);
    if is_new {
        let id = call.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let name = call
            .get("function")
            .and_then(|f| f.get("name"))
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
        events.push(StreamEvent::ToolCallStart { id, name });
    }

    if let Some(args_fragment) = call
        .get("function")
        .and_then(|f| f.get("arguments"))
        .and_then(Value::as_str)
    {
        if let Some(acc) = state.tool_calls.get_mut(&index) {
            acc.arguments_json.push_str(args_fragment);
            events.push(StreamEvent::ToolCallDelta {
                id: acc.id.clone(),
                arguments_delta: args_fragment.to_string(),
            });
        }
    }

    events
}

fn finish(finish_reason: &str, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if state.text_started {
        events.push(StreamEvent::TextEnd);
        state.text_started = false;
    }

    for (_, acc) in state.tool_calls.drain() {
        let arguments = serde_json::from_str(&acc.arguments_json).unwrap_or(Value::Object(Default::default()));
        events.push(StreamEvent::ToolCallEnd {
            id: acc.id,
            name: acc.name,
            arguments,
            thought_signature: acc.thought_signature,
        });
    }

    let stop_reason = match finish_reason {
        "stop" => StopReason::EndTurn,
        "tool_calls" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::Other("unknown"),
    };
    events.push(StreamEvent::Usage {
        input_tokens: state.input_tokens,
        output_tokens: state.output_tokens,
    });
    events.push(StreamEvent::Done { stop_reason });

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_delta_starts_and_accumulates() {
        let mut state = StreamState::new("s1");
        let chunk = json!({ "choices": [{ "delta": { "content": "hi" } }] });
        let events = process_chunk(&chunk, &mut state);
        assert!(matches!(events[0], StreamEvent::TextStart));
        assert!(matches!(&events[1], StreamEvent::TextDelta { delta } if delta == "hi"));
        assert_eq!(state.accumulated_text, "hi");
    }

    #[test]
    fn tool_call_delta_accumulates_arguments_across_chunks() {
        let mut state = StreamState::new("s1");
        let chunk1 = json!({ "choices": [{ "delta": { "tool_calls": [
            { "index": 0, "id": "c1", "function": { "name": "search", "arguments": "{\"q\":" } }
        ]}}]});
        process_chunk(&chunk1, &mut state);
        let chunk2 = json!({ "choices": [{ "delta": { "tool_calls": [
            { "index": 0, "function": { "arguments": "\"x\"}" } }
        ]}}]});
        process_chunk(&chunk2, &mut state);

        let finish_chunk = json!({ "choices": [{ "finish_reason": "tool_calls" }] });
        let events = process_chunk(&finish_chunk, &mut state);
        let tool_end = events
            .iter()
            .find(|e| matches!(e, StreamEvent::ToolCallEnd { .. }))
            .unwrap();
        assert!(matches!(tool_end, StreamEvent::ToolCallEnd { arguments, .. } if arguments["q"] == "x"));
    }

    #[test]
    fn finish_reason_maps_to_stop_reason() {
        let mut state = StreamState::new("s1");
        let chunk = json!({ "choices": [{ "finish_reason": "length" }] });
        let events = process_chunk(&chunk, &mut state);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Done { stop_reason: StopReason::MaxTokens })
        ));
    }
}
