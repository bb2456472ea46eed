//! Upstream error classification (`handleUpstreamError`, spec §4.10).

use llmux_core::Provider;
use serde_json::Value;
use std::time::Duration;

/// The decision `classify_upstream_error` hands back to the retry driver.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryAction {
    /// Sleep for `delay`, then retry the same provider/model/account.
    Retry {
        /// How long to sleep before the next attempt.
        delay: Duration,
    },
    /// Switch to a different model (and possibly provider) and retry
    /// immediately with attempt/account state reset.
    SwitchModel {
        /// The new model to target.
        new_model: String,
        /// The new provider to target, if it also changed.
        new_provider: Option<Provider>,
    },
    /// Every candidate model/provider/account is currently rate-limited;
    /// surface a 429 to the client.
    AllCooldown,
    /// An override project id should be toggled and the request retried
    /// (antigravity "project not found").
    ToggleProjectAndRetry {
        /// The project id to use on retry.
        project_id: String,
    },
    /// Strip thinking from the request body and retry (corrupted thought
    /// signature).
    StripThinkingAndRetry,
    /// Non-retriable: surface an error to the client immediately.
    Throw {
        /// The message to surface.
        message: String,
    },
}

/// Inputs `classify_upstream_error` needs beyond the HTTP status.
pub struct ErrorContext<'a> {
    /// The upstream's raw response body, if any (used to look up
    /// provider-specific retry-delay fields and error markers).
    pub body: Option<&'a Value>,
    /// Parsed `Retry-After` header, already converted to a `Duration`.
    pub retry_after: Option<Duration>,
    /// Whether the model/mapping has any further fallback candidates.
    pub has_fallback: bool,
    /// The next fallback's `(model, provider)`, if `has_fallback`.
    pub fallback: Option<(String, Option<Provider>)>,
    /// Whether every account for the current provider is currently
    /// rate-limited.
    pub all_accounts_rate_limited: bool,
    /// Whether account rotation has any untried account left.
    pub account_rotation_available: bool,
    /// Whether this attempt targeted the antigravity provider.
    pub is_antigravity: bool,
}

const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(30);
const ANTIGRAVITY_DEFAULT_PROJECT_ID: &str = "antigravity-default-project";

/// Marker substrings used to recognize provider-specific error bodies.
/// Kept centralized since the spec leaves their exact matching
/// configurable (see `DESIGN.md` Open Questions).
pub mod markers {
    /// Antigravity's "project not found" 404 body marker.
    pub const PROJECT_NOT_FOUND: &str = "project not found";
    /// The "corrupted thought signature" 400 body marker.
    pub const CORRUPTED_SIGNATURE: &str = "corrupted thought signature";
}

/// Classify a non-2xx upstream response into a [`RetryAction`].
#[must_use]
pub fn classify_upstream_error(status: u16, ctx: &ErrorContext<'_>) -> RetryAction {
    match status {
        429 => classify_rate_limit(ctx),
        401 | 403 => classify_auth_failure(ctx),
        404 if ctx.is_antigravity => classify_not_found(ctx),
        400 => classify_bad_request(ctx),
        500..=599 => RetryAction::Retry {
            delay: Duration::from_millis(1000),
        },
        _ => RetryAction::Throw {
            message: format!("upstream returned unexpected status {status}"),
        },
    }
}

fn classify_rate_limit(ctx: &ErrorContext<'_>) -> RetryAction {
    let delay = ctx
        .retry_after
        .or_else(|| retry_delay_from_body(ctx.body))
        .unwrap_or(DEFAULT_RATE_LIMIT_DELAY);

    if ctx.has_fallback {
        if let Some((model, provider)) = ctx.fallback.clone() {
            return RetryAction::SwitchModel {
                new_model: model,
                new_provider: provider,
            };
        }
    }

    if ctx.all_accounts_rate_limited && !ctx.has_fallback {
        return RetryAction::AllCooldown;
    }

    RetryAction::Retry { delay }
}

fn retry_delay_from_body(body: Option<&Value>) -> Option<Duration> {
    let body = body?;
    let seconds = body
        .get("error")
        .and_then(|e| e.get("retryDelay"))
        .and_then(Value::as_f64)
        .or_else(|| body.get("error").and_then(|e| e.get("retry_after")).and_then(Value::as_f64))?;
    Some(Duration::from_secs_f64(seconds))
}

fn classify_auth_failure(ctx: &ErrorContext<'_>) -> RetryAction {
    if ctx.account_rotation_available {
        RetryAction::Retry {
            delay: Duration::from_millis(0),
        }
    } else {
        RetryAction::Throw {
            message: "authentication failed and no further accounts to rotate to".to_string(),
        }
    }
}

fn classify_not_found(ctx: &ErrorContext<'_>) -> RetryAction {
    let body_text = ctx
        .body
        .map(|b| b.to_string().to_lowercase())
        .unwrap_or_default();
    if body_text.contains(markers::PROJECT_NOT_FOUND) {
        RetryAction::ToggleProjectAndRetry {
            project_id: ANTIGRAVITY_DEFAULT_PROJECT_ID.to_string(),
        }
    } else {
        RetryAction::Throw {
            message: "resource not found".to_string(),
        }
    }
}

fn classify_bad_request(ctx: &ErrorContext<'_>) -> RetryAction {
    let body_text = ctx
        .body
        .map(|b| b.to_string().to_lowercase())
        .unwrap_or_default();
    if body_text.contains(markers::CORRUPTED_SIGNATURE) {
        RetryAction::StripThinkingAndRetry
    } else {
        RetryAction::Throw {
            message: "bad request".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_ctx() -> ErrorContext<'static> {
        ErrorContext {
            body: None,
            retry_after: None,
            has_fallback: false,
            fallback: None,
            all_accounts_rate_limited: false,
            account_rotation_available: false,
            is_antigravity: false,
        }
    }

    #[test]
    fn rate_limit_with_fallback_switches_model() {
        let ctx = ErrorContext {
            has_fallback: true,
            fallback: Some(("claude-3-opus".to_string(), Some(Provider::Anthropic))),
            ..base_ctx()
        };
        let decision = classify_upstream_error(429, &ctx);
        assert_eq!(
            decision,
            RetryAction::SwitchModel {
                new_model: "claude-3-opus".to_string(),
                new_provider: Some(Provider::Anthropic),
            }
        );
    }

    #[test]
    fn rate_limit_with_no_fallback_and_all_accounts_exhausted_is_all_cooldown() {
        let ctx = ErrorContext {
            all_accounts_rate_limited: true,
            ..base_ctx()
        };
        assert_eq!(classify_upstream_error(429, &ctx), RetryAction::AllCooldown);
    }

    #[test]
    fn rate_limit_with_no_fallback_and_accounts_remaining_retries() {
        let ctx = ErrorContext {
            all_accounts_rate_limited: false,
            retry_after: Some(Duration::from_secs(5)),
            ..base_ctx()
        };
        assert_eq!(
            classify_upstream_error(429, &ctx),
            RetryAction::Retry { delay: Duration::from_secs(5) }
        );
    }

    #[test]
    fn rate_limit_falls_back_to_body_retry_delay_then_default() {
        let ctx = ErrorContext {
            body: Some(&serde_json::Value::Null),
            ..base_ctx()
        };
        let body = json!({ "error": { "retryDelay": 12.0 } });
        let ctx = ErrorContext { body: Some(&body), ..ctx };
        assert_eq!(
            classify_upstream_error(429, &ctx),
            RetryAction::Retry { delay: Duration::from_secs_f64(12.0) }
        );
    }

    #[test]
    fn auth_failure_rotates_account_when_available() {
        let ctx = ErrorContext {
            account_rotation_available: true,
            ..base_ctx()
        };
        assert!(matches!(classify_upstream_error(401, &ctx), RetryAction::Retry { .. }));
    }

    #[test]
    fn auth_failure_throws_when_accounts_exhausted() {
        let ctx = base_ctx();
        assert!(matches!(classify_upstream_error(403, &ctx), RetryAction::Throw { .. }));
    }

    #[test]
    fn antigravity_project_not_found_toggles_project() {
        let body = json!({ "error": { "message": "Project not found for this request" } });
        let ctx = ErrorContext {
            body: Some(&body),
            is_antigravity: true,
            ..base_ctx()
        };
        assert!(matches!(
            classify_upstream_error(404, &ctx),
            RetryAction::ToggleProjectAndRetry { .. }
        ));
    }

    #[test]
    fn non_antigravity_404_throws() {
        let ctx = base_ctx();
        assert!(matches!(classify_upstream_error(404, &ctx), RetryAction::Throw { .. }));
    }

    #[test]
    fn corrupted_signature_marker_strips_thinking() {
        let body = json!({ "error": { "message": "Corrupted thought signature detected" } });
        let ctx = ErrorContext { body: Some(&body), ..base_ctx() };
        assert_eq!(classify_upstream_error(400, &ctx), RetryAction::StripThinkingAndRetry);
    }

    #[test]
    fn unrecognized_400_throws() {
        let body = json!({ "error": { "message": "missing required field" } });
        let ctx = ErrorContext { body: Some(&body), ..base_ctx() };
        assert!(matches!(classify_upstream_error(400, &ctx), RetryAction::Throw { .. }));
    }

    #[test]
    fn server_errors_always_retry_with_short_delay() {
        let ctx = base_ctx();
        assert_eq!(
            classify_upstream_error(503, &ctx),
            RetryAction::Retry { delay: Duration::from_millis(1000) }
        );
    }
}
