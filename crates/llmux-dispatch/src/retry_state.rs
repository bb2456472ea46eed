//! Per-request retry state threaded through the [`crate::retry_driver`] loop.
//!
//! Unlike `CooldownManager`/`AccountRotationManager`, this state belongs to
//! one in-flight request and needs no synchronization.

use llmux_core::Provider;

/// Mutable state carried across attempts of a single request's retry loop.
#[derive(Clone, Debug)]
pub struct RetryState {
    /// Attempts made so far (1-based once incremented for the current one).
    pub attempt: u32,
    /// The model originally requested by the client, before any mapping.
    pub original_model: String,
    /// The model currently being attempted (may differ after a
    /// [`crate::classify::RetryAction::SwitchModel`]).
    pub current_model: String,
    /// The provider currently being attempted.
    pub current_provider: Provider,
    /// Index into the current provider's account list.
    pub account_index: usize,
    /// Antigravity-specific endpoint fallback index.
    pub antigravity_endpoint_index: usize,
    /// Antigravity project id override, set by a
    /// [`crate::classify::RetryAction::ToggleProjectAndRetry`].
    pub override_project_id: Option<String>,
}

impl RetryState {
    /// Start fresh retry state for a newly dispatched request.
    #[must_use]
    pub fn new(original_model: String, provider: Provider) -> Self {
        Self {
            attempt: 0,
            current_model: original_model.clone(),
            original_model,
            current_provider: provider,
            account_index: 0,
            antigravity_endpoint_index: 0,
            override_project_id: None,
        }
    }

    /// Apply a model/provider switch, resetting per-attempt account and
    /// endpoint state as spec §4.10 step 9 requires.
    pub fn switch_model(&mut self, new_model: String, new_provider: Option<Provider>) {
        self.current_model = new_model;
        if let Some(provider) = new_provider {
            self.current_provider = provider;
        }
        self.account_index = 0;
        self.antigravity_endpoint_index = 0;
        self.override_project_id = None;
        self.attempt = 0;
    }

    /// Whether the model or provider has changed since the request was
    /// first dispatched — used to decide whether thought signatures must be
    /// stripped before re-sending (spec §4.10 step 6).
    #[must_use]
    pub fn model_or_provider_changed(&self, original_provider: Provider) -> bool {
        self.current_model != self.original_model || self.current_provider != original_provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_model_resets_account_and_attempt_state() {
        let mut state = RetryState::new("gpt-4".to_string(), Provider::Openai);
        state.attempt = 3;
        state.account_index = 2;
        state.override_project_id = Some("proj".to_string());

        state.switch_model("claude-3-opus".to_string(), Some(Provider::Anthropic));

        assert_eq!(state.current_model, "claude-3-opus");
        assert_eq!(state.current_provider, Provider::Anthropic);
        assert_eq!(state.account_index, 0);
        assert_eq!(state.attempt, 0);
        assert!(state.override_project_id.is_none());
    }

    #[test]
    fn model_or_provider_changed_detects_model_only_change() {
        let mut state = RetryState::new("gpt-4".to_string(), Provider::Openai);
        state.current_model = "gpt-4o".to_string();
        assert!(state.model_or_provider_changed(Provider::Openai));
    }

    #[test]
    fn unchanged_state_reports_no_change() {
        let state = RetryState::new("gpt-4".to_string(), Provider::Openai);
        assert!(!state.model_or_provider_changed(Provider::Openai));
    }
}
