//! # llmux-core
//!
//! Shared vocabulary for the dispatch gateway:
//!
//! - [`part`]: dialect-agnostic conversation tree (`Message`, `Part`)
//! - [`error`]: the [`GatewayError`](error::GatewayError) taxonomy shared by every
//!   retry/classification decision in the gateway
//! - [`hash`]: stable content hashing used to key the signature cache
//! - [`Provider`]: the fixed set of upstream providers the gateway dispatches to

#![deny(unsafe_code)]

pub mod error;
pub mod hash;
pub mod part;

pub use error::GatewayError;
pub use part::{Message, Part, Role};

use serde::{Deserialize, Serialize};
use std::fmt;

/// An upstream provider the gateway can dispatch a request to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// OpenAI's own API.
    Openai,
    /// Anthropic's own API.
    Anthropic,
    /// Google Gemini's own API.
    Gemini,
    /// "Antigravity" project-scoped Gemini variant.
    Antigravity,
    /// OpenAI web/Codex session-based backend.
    OpenaiWeb,
    /// Opencode-Zen aggregator.
    OpencodeZen,
}

impl Provider {
    /// All providers, in a stable order used for default fallback chains.
    #[must_use]
    pub fn all() -> &'static [Provider] {
        &[
            Provider::Openai,
            Provider::Anthropic,
            Provider::Gemini,
            Provider::Antigravity,
            Provider::OpenaiWeb,
            Provider::OpencodeZen,
        ]
    }

    /// Parse the wire/config name of a provider (case-sensitive, as used in
    /// `"model:provider"` mapping suffixes and cooldown keys).
    #[must_use]
    pub fn parse(s: &str) -> Option<Provider> {
        match s {
            "openai" => Some(Provider::Openai),
            "anthropic" => Some(Provider::Anthropic),
            "gemini" => Some(Provider::Gemini),
            "antigravity" => Some(Provider::Antigravity),
            "openai-web" => Some(Provider::OpenaiWeb),
            "opencode-zen" => Some(Provider::OpencodeZen),
            _ => None,
        }
    }

    /// The canonical wire name of this provider.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Antigravity => "antigravity",
            Provider::OpenaiWeb => "openai-web",
            Provider::OpencodeZen => "opencode-zen",
        }
    }

    /// Coarse model family used to gate thinking/signature policy.
    #[must_use]
    pub fn family(&self) -> ModelFamily {
        match self {
            Provider::Openai | Provider::OpenaiWeb | Provider::OpencodeZen => ModelFamily::Openai,
            Provider::Anthropic => ModelFamily::Claude,
            Provider::Gemini | Provider::Antigravity => ModelFamily::Gemini,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse model classification used to gate signature-caching policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Anthropic Claude models.
    Claude,
    /// Google Gemini models.
    Gemini,
    /// OpenAI models (thinking is never cached for this family).
    Openai,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelFamily::Claude => "claude",
            ModelFamily::Gemini => "gemini",
            ModelFamily::Openai => "openai",
        };
        f.write_str(s)
    }
}

/// The wire dialect an inbound or outbound request/response is encoded in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// OpenAI Chat Completions (`/v1/chat/completions`).
    OpenaiChat,
    /// Anthropic Messages (`/v1/messages`).
    AnthropicMessages,
    /// Google Gemini `generateContent`.
    GeminiGenerateContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_wire_name() {
        for p in Provider::all() {
            assert_eq!(Provider::parse(p.as_str()), Some(*p));
        }
    }

    #[test]
    fn provider_family_mapping() {
        assert_eq!(Provider::Openai.family(), ModelFamily::Openai);
        assert_eq!(Provider::OpenaiWeb.family(), ModelFamily::Openai);
        assert_eq!(Provider::OpencodeZen.family(), ModelFamily::Openai);
        assert_eq!(Provider::Anthropic.family(), ModelFamily::Claude);
        assert_eq!(Provider::Gemini.family(), ModelFamily::Gemini);
        assert_eq!(Provider::Antigravity.family(), ModelFamily::Gemini);
    }

    #[test]
    fn unknown_provider_name_is_none() {
        assert_eq!(Provider::parse("made-up"), None);
    }
}
