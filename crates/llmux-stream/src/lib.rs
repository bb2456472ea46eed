//! Incremental SSE parsing and per-dialect streaming chunk transformation
//! (C9 StreamTransform).
//!
//! [`sse::parse_sse_lines`] turns a byte stream into [`sse::SseFrame`]s
//! without knowing anything about a dialect's JSON shape; [`process_frame`]
//! then hands a frame's JSON payload to the right dialect module and
//! produces dialect-agnostic [`event::StreamEvent`]s the dispatcher and HTTP
//! layer can work with uniformly. A frame whose JSON fails to parse is
//! passed through verbatim rather than dropped, so an unrecognized or
//! malformed upstream frame still reaches the client.

pub mod anthropic;
pub mod event;
pub mod gemini;
pub mod openai;
pub mod sse;
pub mod state;

pub use event::{StopReason, StreamEvent};
pub use sse::{SseFrame, SseParserOptions, parse_sse_lines};
pub use state::StreamState;

use llmux_core::Dialect;
use serde_json::Value;

/// Outcome of processing one [`SseFrame::Data`] frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The frame parsed and produced zero or more canonical events.
    Events(Vec<StreamEvent>),
    /// The frame's JSON body didn't parse; forward the raw text untouched.
    Passthrough(String),
}

/// Parse `data` as JSON and dispatch it to the dialect-specific chunk
/// processor. Anthropic additionally needs the `event:` line's name, since
/// its stream multiplexes several event types rather than tagging each
/// payload.
pub fn process_frame(
    dialect: Dialect,
    anthropic_event_type: Option<&str>,
    data: &str,
    state: &mut StreamState,
) -> FrameOutcome {
    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return FrameOutcome::Passthrough(data.to_string());
    };

    let events = match dialect {
        Dialect::AnthropicMessages => {
            let event_type = anthropic_event_type.unwrap_or("");
            anthropic::process_event(event_type, &json, state)
        }
        Dialect::OpenaiChat => openai::process_chunk(&json, state),
        Dialect::GeminiGenerateContent => gemini::process_chunk(&json, state),
    };

    FrameOutcome::Events(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_frame_passes_through_verbatim() {
        let mut state = StreamState::new("s1");
        let outcome = process_frame(Dialect::OpenaiChat, None, "not json", &mut state);
        assert!(matches!(outcome, FrameOutcome::Passthrough(s) if s == "not json"));
    }

    #[test]
    fn openai_frame_dispatches_to_openai_module() {
        let mut state = StreamState::new("s1");
        let outcome = process_frame(
            Dialect::OpenaiChat,
            None,
            r#"{"choices":[{"delta":{"content":"hi"}}]}"#,
            &mut state,
        );
        match outcome {
            FrameOutcome::Events(events) => {
                assert!(matches!(events[0], StreamEvent::TextStart));
            }
            FrameOutcome::Passthrough(_) => panic!("expected events"),
        }
    }

    #[test]
    fn anthropic_frame_requires_event_type() {
        let mut state = StreamState::new("s1");
        let outcome = process_frame(
            Dialect::AnthropicMessages,
            Some("content_block_start"),
            r#"{"index":0,"content_block":{"type":"text"}}"#,
            &mut state,
        );
        match outcome {
            FrameOutcome::Events(events) => assert!(matches!(events[0], StreamEvent::TextStart)),
            FrameOutcome::Passthrough(_) => panic!("expected events"),
        }
    }
}
