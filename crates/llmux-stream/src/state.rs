//! Mutable state accumulated across the chunks of a single upstream stream.

use std::collections::HashMap;

/// Per-stream accumulator, threaded through every call to a dialect's
/// `process_chunk`.
pub struct StreamState {
    /// Accumulated text content of the current/most recent text block.
    pub accumulated_text: String,
    /// Accumulated thinking content of the current/most recent thinking
    /// block.
    pub accumulated_thinking: String,
    /// Signature captured for the in-progress thinking block, if the
    /// dialect attaches one incrementally (Anthropic `signature_delta`).
    pub thinking_signature: Option<String>,
    /// Whether a text block is currently open.
    pub text_started: bool,
    /// Whether a thinking block is currently open.
    pub thinking_started: bool,
    /// In-progress tool calls, keyed by the dialect's own block/tool index
    /// (Anthropic content block index, OpenAI `tool_calls[].index`).
    pub tool_calls: HashMap<u32, ToolCallAccumulator>,
    /// Monotonic counter used to synthesize tool call ids for dialects that
    /// don't provide one (Gemini).
    pub synthetic_tool_call_index: u32,
    /// Unique per-stream prefix mixed into synthesized tool call ids so two
    /// concurrent streams never collide.
    pub synthetic_id_prefix: String,
    /// Input/prompt tokens reported so far.
    pub input_tokens: u64,
    /// Output/completion tokens reported so far.
    pub output_tokens: u64,
    /// Set once any tool call has been emitted this stream, used to patch
    /// an `end_turn`-shaped finish reason to `tool_use`.
    pub any_tool_call: bool,
}

/// Partial state of a tool call whose arguments are still streaming in.
#[derive(Default)]
pub struct ToolCallAccumulator {
    /// Tool call id.
    pub id: String,
    /// Tool name, known from the call's start event.
    pub name: String,
    /// Raw JSON text accumulated so far.
    pub arguments_json: String,
    /// Gemini-style thought signature, if attached.
    pub thought_signature: Option<String>,
}

impl StreamState {
    /// Construct fresh state for a new stream, seeded with a unique id
    /// prefix so synthesized tool call ids don't collide across concurrent
    /// streams sharing a process.
    #[must_use]
    pub fn new(stream_id: &str) -> Self {
        Self {
            accumulated_text: String::new(),
            accumulated_thinking: String::new(),
            thinking_signature: None,
            text_started: false,
            thinking_started: false,
            tool_calls: HashMap::new(),
            synthetic_tool_call_index: 0,
            synthetic_id_prefix: stream_id.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            any_tool_call: false,
        }
    }

    /// Synthesize the next sequential tool call id for a dialect that
    /// doesn't provide one on the wire.
    pub fn next_synthetic_tool_call_id(&mut self) -> String {
        let id = format!("call_{}_{}", self.synthetic_id_prefix, self.synthetic_tool_call_index);
        self.synthetic_tool_call_index += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_ids_are_sequential_and_prefixed() {
        let mut state = StreamState::new("abc");
        assert_eq!(state.next_synthetic_tool_call_id(), "call_abc_0");
        assert_eq!(state.next_synthetic_tool_call_id(), "call_abc_1");
    }
}
