//! Dialect-agnostic streaming event vocabulary, emitted by every per-dialect
//! chunk processor in this crate.

use serde_json::Value;

/// One incremental streaming event, independent of wire dialect.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// A text content block has started.
    TextStart,
    /// A chunk of text content.
    TextDelta {
        /// The text fragment.
        delta: String,
    },
    /// The current text content block has ended.
    TextEnd,
    /// A thinking/reasoning block has started.
    ThinkingStart,
    /// A chunk of thinking content.
    ThinkingDelta {
        /// The thinking text fragment.
        delta: String,
    },
    /// The current thinking block has ended, carrying the accumulated text
    /// and a signature if the upstream attached one to this chunk.
    ThinkingEnd {
        /// Full accumulated thinking text for this block.
        thinking: String,
        /// Signature captured mid-block, if any.
        signature: Option<String>,
    },
    /// A tool call has started.
    ToolCallStart {
        /// Generated or upstream-provided tool call id.
        id: String,
        /// Tool name.
        name: String,
    },
    /// A chunk of a tool call's argument JSON, as raw text.
    ToolCallDelta {
        /// The tool call this delta belongs to.
        id: String,
        /// Raw (possibly partial) JSON text fragment.
        arguments_delta: String,
    },
    /// A tool call has finished, with fully parsed arguments.
    ToolCallEnd {
        /// Tool call id.
        id: String,
        /// Tool name.
        name: String,
        /// Parsed arguments.
        arguments: Value,
        /// Gemini-style thought signature attached to the call, if any.
        thought_signature: Option<String>,
    },
    /// Token usage reported by the upstream for this stream.
    Usage {
        /// Input/prompt tokens.
        input_tokens: u64,
        /// Output/completion tokens.
        output_tokens: u64,
    },
    /// The stream has finished.
    Done {
        /// Canonicalized stop reason.
        stop_reason: StopReason,
    },
    /// An error frame was reported by the upstream mid-stream.
    Error {
        /// The error message.
        message: String,
    },
}

/// Canonicalized stop/finish reason, independent of wire dialect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced a natural end of turn.
    EndTurn,
    /// The model requested one or more tool calls.
    ToolUse,
    /// The model hit its maximum token budget.
    MaxTokens,
    /// The response was blocked by a safety filter.
    ContentFilter,
    /// Any other/unrecognized reason, kept verbatim.
    Other(&'static str),
}
