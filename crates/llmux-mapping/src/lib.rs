//! Model-name alias resolution (spec component C3).

#![deny(unsafe_code)]

use llmux_core::Provider;
use serde::{Deserialize, Serialize};

/// One configured `from -> to` alias. `to` may itself encode a provider
/// suffix (`"gpt-4o:openai"`) and/or a leading `"thinking:"` flag
/// (`"thinking:claude-3-5-sonnet"`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelMapping {
    /// The source model name as requested by the client (matched
    /// case-insensitively).
    pub from: String,
    /// One or more target model specs, most-preferred first. Additional
    /// entries beyond the first are fallbacks for the router (C4) to use.
    pub to: ToSpec,
}

/// Either a single mapping target or an ordered list of fallbacks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToSpec {
    /// A single target.
    One(String),
    /// An ordered list; first is primary, rest are fallbacks.
    Many(Vec<String>),
}

impl ToSpec {
    fn entries(&self) -> Vec<&str> {
        match self {
            ToSpec::One(s) => vec![s.as_str()],
            ToSpec::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// The fully resolved result of applying a [`ModelMapping`] to a requested
/// model name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedModel {
    /// The resolved model name (provider suffix and thinking prefix
    /// stripped).
    pub model: String,
    /// The provider named by an explicit `"model:provider"` suffix, if any.
    pub provider: Option<Provider>,
    /// Whether a `"thinking:"` prefix enabled extended reasoning.
    pub thinking: bool,
    /// Remaining fallback target specs (unparsed), in order, for the router
    /// to try if this one is unavailable.
    pub fallbacks: Vec<String>,
}

/// Parse one `to` entry into `(model, provider?, thinking)`.
#[must_use]
pub fn parse_target(raw: &str) -> (String, Option<Provider>, bool) {
    let (thinking, rest) = match raw.strip_prefix("thinking:") {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    match rest.rsplit_once(':') {
        Some((model, provider_str)) if Provider::parse(provider_str).is_some() => {
            (model.to_string(), Provider::parse(provider_str), thinking)
        }
        _ => (rest.to_string(), None, thinking),
    }
}

/// Resolve `requested` against a list of mappings, picking the
/// longest/most-specific match. Exact (case-insensitive) matches always win
/// over substring matches; among substring matches the longest `from` wins.
#[must_use]
pub fn resolve(requested: &str, mappings: &[ModelMapping]) -> Option<ResolvedModel> {
    let requested_lower = requested.to_lowercase();

    let exact = mappings
        .iter()
        .find(|m| m.from.to_lowercase() == requested_lower);

    let candidate = exact.or_else(|| {
        mappings
            .iter()
            .filter(|m| requested_lower.contains(&m.from.to_lowercase()))
            .max_by_key(|m| m.from.len())
    })?;

    let entries = candidate.to.entries();
    let (primary, rest) = entries.split_first()?;
    let (model, provider, thinking) = parse_target(primary);

    Some(ResolvedModel {
        model,
        provider,
        thinking,
        fallbacks: rest.iter().map(|s| (*s).to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(from: &str, to: ToSpec) -> ModelMapping {
        ModelMapping {
            from: from.to_string(),
            to,
        }
    }

    #[test]
    fn exact_match_wins_over_substring() {
        let mappings = vec![
            mapping("gpt-4", ToSpec::One("substring-hit".into())),
            mapping("gpt-4-turbo", ToSpec::One("exact-hit".into())),
        ];
        let resolved = resolve("gpt-4-turbo", &mappings).unwrap();
        assert_eq!(resolved.model, "exact-hit");
    }

    #[test]
    fn case_insensitive_match() {
        let mappings = vec![mapping("GPT-4", ToSpec::One("gpt-4o".into()))];
        let resolved = resolve("gpt-4", &mappings).unwrap();
        assert_eq!(resolved.model, "gpt-4o");
    }

    #[test]
    fn provider_suffix_is_extracted() {
        let (model, provider, thinking) = parse_target("gpt-4o:openai");
        assert_eq!(model, "gpt-4o");
        assert_eq!(provider, Some(Provider::Openai));
        assert!(!thinking);
    }

    #[test]
    fn thinking_prefix_is_extracted_alongside_provider_suffix() {
        let (model, provider, thinking) = parse_target("thinking:claude-3-5-sonnet:anthropic");
        assert_eq!(model, "claude-3-5-sonnet");
        assert_eq!(provider, Some(Provider::Anthropic));
        assert!(thinking);
    }

    #[test]
    fn unknown_trailing_segment_is_not_mistaken_for_a_provider() {
        let (model, provider, _) = parse_target("claude-3-5-sonnet-20241022");
        assert_eq!(model, "claude-3-5-sonnet-20241022");
        assert_eq!(provider, None);
    }

    #[test]
    fn list_target_yields_fallbacks_in_order() {
        let mappings = vec![mapping(
            "gpt-4",
            ToSpec::Many(vec![
                "gpt-4".into(),
                "gpt-3.5-turbo".into(),
                "claude-3-opus:anthropic".into(),
            ]),
        )];
        let resolved = resolve("gpt-4", &mappings).unwrap();
        assert_eq!(resolved.model, "gpt-4");
        assert_eq!(
            resolved.fallbacks,
            vec!["gpt-3.5-turbo".to_string(), "claude-3-opus:anthropic".to_string()]
        );
    }

    #[test]
    fn no_match_returns_none() {
        let mappings = vec![mapping("gpt-4", ToSpec::One("gpt-4o".into()))];
        assert!(resolve("totally-unrelated", &mappings).is_none());
    }

    #[test]
    fn longest_substring_match_wins() {
        let mappings = vec![
            mapping("sonnet", ToSpec::One("short".into())),
            mapping("claude-3-5-sonnet", ToSpec::One("long".into())),
        ];
        let resolved = resolve("claude-3-5-sonnet-20241022", &mappings).unwrap();
        assert_eq!(resolved.model, "long");
    }
}
