//! Dialect-agnostic conversation tree.
//!
//! Every wire dialect (OpenAI, Anthropic, Gemini) is converted into this
//! representation before `llmux-thinking` runs strip/inject/turn-separation
//! logic, then converted back out by `llmux-dialects`. Writing that logic
//! once against this shape, rather than three times against three wire
//! formats, is the whole point of having it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role a message in the conversation tree was authored under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human (or tool-orchestrating client) turn.
    User,
    /// A model-generated turn.
    Assistant,
    /// A system instruction. Dialects that hoist this out of the message
    /// list (Anthropic, Gemini) still represent it as a message here.
    System,
}

/// One message in the dialect-agnostic conversation tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored this message.
    pub role: Role,
    /// The ordered content parts of this message.
    pub parts: Vec<Part>,
}

impl Message {
    /// Construct a message from a single text part.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// True if any part of this message is a [`Part::ToolUse`].
    #[must_use]
    pub fn has_tool_use(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolUse { .. }))
    }

    /// True if any part of this message is a [`Part::ToolResult`].
    #[must_use]
    pub fn has_tool_result(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::ToolResult { .. }))
    }

    /// True if any part of this message is a [`Part::Thinking`].
    #[must_use]
    pub fn has_thinking(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Thinking { .. }))
    }
}

/// A tagged content part. Fields that a given dialect doesn't support are
/// simply ignored on re-emission; fields a dialect spells differently
/// (`signature` / `thoughtSignature` / `thought_signature`) are canonicalized
/// here under one name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Part {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text content.
        text: String,
    },
    /// An extended-reasoning / "thinking" block.
    #[serde(rename = "thinking")]
    Thinking {
        /// The thinking text. May be empty once stripped of everything but
        /// the marker, but the part itself is dropped rather than kept empty
        /// (see `llmux-thinking`'s strip invariant).
        text: String,
        /// Canonicalized signature, if the upstream model supplied one.
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// A tool invocation requested by the model.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// The tool call id, used to correlate the eventual `ToolResult`.
        id: String,
        /// The tool name.
        name: String,
        /// Tool arguments as a JSON object.
        arguments: Value,
        /// Gemini "thought signature" attached to a function call part.
        #[serde(skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    /// The result of a previously requested tool invocation.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// The tool call id this result answers.
        tool_use_id: String,
        /// Result content, either plain text or a nested part list.
        content: ToolResultContent,
        /// Whether the tool call ended in an error.
        #[serde(default)]
        is_error: bool,
    },
    /// Any content this canonical model does not otherwise represent
    /// (images, documents, provider-specific extensions). Kept verbatim so
    /// round-tripping through the canonical tree never loses data.
    #[serde(rename = "other")]
    Other {
        /// The original dialect-specific JSON value.
        raw: Value,
    },
}

/// Content carried by a [`Part::ToolResult`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// Plain-text result.
    Text(String),
    /// Structured result, itself a list of parts (e.g. text + image).
    Parts(Vec<Part>),
}

impl Part {
    /// Canonicalize one of the three wire spellings of a thought signature
    /// field name found on an arbitrary JSON object, returning the value if
    /// present under any of them.
    #[must_use]
    pub fn extract_signature_field(obj: &serde_json::Map<String, Value>) -> Option<String> {
        for key in ["signature", "thoughtSignature", "thought_signature"] {
            if let Some(Value::String(s)) = obj.get(key) {
                return Some(s.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_text_has_no_tool_use_or_thinking() {
        let m = Message::text(Role::User, "hi");
        assert!(!m.has_tool_use());
        assert!(!m.has_tool_result());
        assert!(!m.has_thinking());
    }

    #[test]
    fn message_detects_tool_use() {
        let m = Message {
            role: Role::Assistant,
            parts: vec![Part::ToolUse {
                id: "t1".into(),
                name: "search".into(),
                arguments: json!({}),
                thought_signature: None,
            }],
        };
        assert!(m.has_tool_use());
    }

    #[test]
    fn extract_signature_field_checks_all_three_aliases() {
        let mut obj = serde_json::Map::new();
        obj.insert("thought_signature".into(), json!("sig-a"));
        assert_eq!(
            Part::extract_signature_field(&obj),
            Some("sig-a".to_string())
        );
    }

    #[test]
    fn extract_signature_field_absent_returns_none() {
        let obj = serde_json::Map::new();
        assert_eq!(Part::extract_signature_field(&obj), None);
    }

    #[test]
    fn thinking_part_serializes_without_signature_when_none() {
        let p = Part::Thinking {
            text: "reasoning".into(),
            signature: None,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert!(v.get("signature").is_none());
    }
}
