//! Primary + fallback model resolution (spec component C4).

#![deny(unsafe_code)]

use llmux_core::Provider;
use llmux_cooldown::CooldownManager;
use llmux_mapping::{self as mapping, ModelMapping};

/// The outcome of resolving a requested model against the configured
/// mappings and the current cooldown state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// The provider to dispatch to.
    pub provider: Provider,
    /// The model name to send upstream.
    pub model: String,
    /// Whether extended reasoning ("thinking") was requested by the mapping.
    pub thinking: bool,
}

fn cooldown_key(provider: Provider, model: &str) -> String {
    format!("{}:{model}", provider.as_str())
}

/// Infer a provider from an unmapped model name's prefix. Returns `None` if
/// no heuristic matches the catch-all `openai` default should be used.
#[must_use]
pub fn infer_provider_from_name(model: &str) -> Provider {
    let lower = model.to_lowercase();
    if lower.starts_with("gpt-") || lower.starts_with("o1") || lower.starts_with("o3") {
        Provider::Openai
    } else if lower.starts_with("claude-") {
        Provider::Anthropic
    } else if lower.starts_with("gemini-") {
        Provider::Gemini
    } else {
        Provider::Openai
    }
}

/// Parse a `"model:provider"` suffix, if the trailing segment names a real
/// provider.
#[must_use]
pub fn split_explicit_provider_suffix(model: &str) -> (String, Option<Provider>) {
    match model.rsplit_once(':') {
        Some((name, provider_str)) if Provider::parse(provider_str).is_some() => {
            (name.to_string(), Provider::parse(provider_str))
        }
        _ => (model.to_string(), None),
    }
}

/// Resolve `requested_model` to a `(provider, model)` pair, consulting the
/// configured mappings and the cooldown manager for fallback selection.
///
/// Mirrors the spec's §4.4 five-step algorithm:
/// 1. Look up a configured mapping.
/// 2. If the primary target's cooldown key is available, use it.
/// 3. Otherwise walk the mapping's fallbacks in order.
/// 4. If every candidate is in cooldown, fall back to the primary anyway
///    (the retry driver turns this into an `all-cooldown` response once it
///    also observes exhausted accounts).
/// 5. For unmapped models: explicit `"model:provider"` suffix, else a
///    provider-name-prefix heuristic, else `openai`.
#[must_use]
pub fn resolve_model(
    requested_model: &str,
    mappings: &[ModelMapping],
    cooldowns: &CooldownManager,
) -> Resolution {
    if let Some(resolved) = mapping::resolve(requested_model, mappings) {
        let primary_provider = resolved
            .provider
            .unwrap_or_else(|| infer_provider_from_name(&resolved.model));

        if cooldowns.is_available(&cooldown_key(primary_provider, &resolved.model)) {
            return Resolution {
                provider: primary_provider,
                model: resolved.model,
                thinking: resolved.thinking,
            };
        }

        for fallback in &resolved.fallbacks {
            let (model, provider) = split_explicit_provider_suffix(fallback);
            let provider = provider.unwrap_or_else(|| infer_provider_from_name(&model));
            if cooldowns.is_available(&cooldown_key(provider, &model)) {
                return Resolution {
                    provider,
                    model,
                    thinking: resolved.thinking,
                };
            }
        }

        tracing::warn!(
            requested_model,
            "all mapped candidates in cooldown, returning primary anyway"
        );
        return Resolution {
            provider: primary_provider,
            model: resolved.model,
            thinking: resolved.thinking,
        };
    }

    let (model, explicit_provider) = split_explicit_provider_suffix(requested_model);
    let provider = explicit_provider.unwrap_or_else(|| infer_provider_from_name(&model));
    Resolution {
        provider,
        model,
        thinking: false,
    }
}

/// Record a successful dispatch: clears the cooldown for `provider:model`.
pub fn handle_success(cooldowns: &CooldownManager, provider: Provider, model: &str) {
    cooldowns.reset(&cooldown_key(provider, model));
}

/// Record a rate limit for `provider:model`.
pub fn handle_rate_limit(
    cooldowns: &CooldownManager,
    provider: Provider,
    model: &str,
    retry_after: Option<std::time::Duration>,
) -> std::time::Duration {
    cooldowns.mark_rate_limited(&cooldown_key(provider, model), retry_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmux_mapping::ToSpec;

    fn mappings() -> Vec<ModelMapping> {
        vec![
            ModelMapping {
                from: "gpt-4".into(),
                to: ToSpec::Many(vec![
                    "gpt-4:openai".into(),
                    "gpt-3.5-turbo:openai".into(),
                    "claude-3-opus:anthropic".into(),
                ]),
            },
            ModelMapping {
                from: "gpt-3.5-turbo".into(),
                to: ToSpec::One("gpt-3.5-turbo:openai".into()),
            },
            ModelMapping {
                from: "claude-3-opus".into(),
                to: ToSpec::One("claude-3-opus:anthropic".into()),
            },
        ]
    }

    #[test]
    fn primary_used_when_available() {
        let cooldowns = CooldownManager::new();
        let r = resolve_model("gpt-4", &mappings(), &cooldowns);
        assert_eq!(r.provider, Provider::Openai);
        assert_eq!(r.model, "gpt-4");
    }

    #[test]
    fn falls_back_through_chain_scenario_from_spec() {
        let cooldowns = CooldownManager::new();
        cooldowns.mark_rate_limited("openai:gpt-4", Some(std::time::Duration::from_secs(60)));
        cooldowns.mark_rate_limited(
            "openai:gpt-3.5-turbo",
            Some(std::time::Duration::from_secs(60)),
        );
        let r = resolve_model("gpt-4", &mappings(), &cooldowns);
        assert_eq!(r.provider, Provider::Anthropic);
        assert_eq!(r.model, "claude-3-opus");

        cooldowns.mark_rate_limited(
            "anthropic:claude-3-opus",
            Some(std::time::Duration::from_secs(60)),
        );
        let r2 = resolve_model("gpt-4", &mappings(), &cooldowns);
        assert_eq!(r2.provider, Provider::Openai);
        assert_eq!(r2.model, "gpt-4");
    }

    #[test]
    fn unmapped_model_infers_provider_from_prefix() {
        let cooldowns = CooldownManager::new();
        let r = resolve_model("claude-3-5-haiku", &[], &cooldowns);
        assert_eq!(r.provider, Provider::Anthropic);
    }

    #[test]
    fn unmapped_model_with_explicit_suffix_wins_over_prefix_heuristic() {
        let cooldowns = CooldownManager::new();
        let r = resolve_model("some-custom-model:gemini", &[], &cooldowns);
        assert_eq!(r.provider, Provider::Gemini);
        assert_eq!(r.model, "some-custom-model");
    }

    #[test]
    fn unmapped_model_with_no_heuristic_defaults_to_openai() {
        let cooldowns = CooldownManager::new();
        let r = resolve_model("some-unknown-thing", &[], &cooldowns);
        assert_eq!(r.provider, Provider::Openai);
    }

    #[test]
    fn handle_success_clears_cooldown() {
        let cooldowns = CooldownManager::new();
        cooldowns.mark_rate_limited("openai:gpt-4", None);
        handle_success(&cooldowns, Provider::Openai, "gpt-4");
        assert!(cooldowns.is_available("openai:gpt-4"));
    }
}
