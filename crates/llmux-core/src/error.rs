//! The gateway-wide error taxonomy.
//!
//! [`GatewayError`] is the single enum the retry driver classifies upstream
//! outcomes into. Everything downstream of classification (the retry state
//! machine, the HTTP response builder) matches on this rather than on raw
//! status codes.

use serde::Serialize;
use thiserror::Error;

/// The curated error body returned to a client for a terminal, non-2xx
/// outcome. Never carries the raw upstream stack trace.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub message: String,
    /// Coarse error type, e.g. `"rate_limit_error"`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Machine-readable code, when one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// The gateway's error taxonomy (see the spec's Error Handling Design).
///
/// This does not carry the retry *decision* (that is
/// `llmux_dispatch::RetryAction`) — only the classification of what went
/// wrong, which the retry driver consumes to compute that decision.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level failure or a 5xx response. Retried with a short delay.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// A 429 response. Carries the duration (already jittered) the cooldown
    /// manager should apply.
    #[error("rate limited, retry after {retry_after_ms}ms: {message}")]
    RateLimit {
        /// The message from the upstream body, if any.
        message: String,
        /// Duration to cool down for, in milliseconds.
        retry_after_ms: u64,
    },

    /// A 401/403 response; triggers account rotation.
    #[error("auth rejected: {0}")]
    AuthTransient(String),

    /// An antigravity 404 carrying the "project not found" marker.
    #[error("upstream project not found: {0}")]
    ProjectMissing(String),

    /// A 400 carrying a "corrupted thought signature" marker.
    #[error("signature rejected by upstream: {0}")]
    SignatureCorruption(String),

    /// Any other terminal 4xx, or one the driver has no recovery for.
    #[error("non-retriable upstream error ({status}): {message}")]
    NonRetriable {
        /// The upstream HTTP status code.
        status: u16,
        /// The upstream error message.
        message: String,
    },

    /// The client disconnected or the request was otherwise cancelled.
    #[error("request cancelled")]
    Cancelled,
}

impl GatewayError {
    /// All available models/providers are in cooldown. Distinct from
    /// [`GatewayError::RateLimit`]: this is raised by the retry driver after
    /// it has exhausted every fallback, not by error classification itself.
    #[must_use]
    pub fn all_cooldown_body() -> ErrorBody {
        ErrorBody {
            message: "All available models and providers are currently rate-limited. \
                      Please try again later."
                .to_string(),
            error_type: "rate_limit_error".to_string(),
            code: Some("all_providers_cooldown".to_string()),
        }
    }

    /// Render the curated client-facing body and HTTP status for a terminal
    /// outcome. [`GatewayError::RateLimit`] is expected to have already been
    /// converted to a retry or the all-cooldown body before reaching here;
    /// calling this on it still produces a reasonable 429.
    #[must_use]
    pub fn to_response(&self) -> (u16, ErrorBody) {
        match self {
            GatewayError::Transient(msg) => (
                502,
                ErrorBody {
                    message: msg.clone(),
                    error_type: "upstream_error".to_string(),
                    code: None,
                },
            ),
            GatewayError::RateLimit { message, .. } => (
                429,
                ErrorBody {
                    message: message.clone(),
                    error_type: "rate_limit_error".to_string(),
                    code: None,
                },
            ),
            GatewayError::AuthTransient(msg) => (
                401,
                ErrorBody {
                    message: msg.clone(),
                    error_type: "authentication_error".to_string(),
                    code: None,
                },
            ),
            GatewayError::ProjectMissing(msg) => (
                404,
                ErrorBody {
                    message: msg.clone(),
                    error_type: "not_found_error".to_string(),
                    code: None,
                },
            ),
            GatewayError::SignatureCorruption(msg) => (
                400,
                ErrorBody {
                    message: msg.clone(),
                    error_type: "invalid_request_error".to_string(),
                    code: None,
                },
            ),
            GatewayError::NonRetriable { status, message } => (
                if (100..600).contains(status) { *status } else { 500 },
                ErrorBody {
                    message: message.clone(),
                    error_type: "api_error".to_string(),
                    code: None,
                },
            ),
            GatewayError::Cancelled => (
                499,
                ErrorBody {
                    message: "request cancelled".to_string(),
                    error_type: "cancelled".to_string(),
                    code: None,
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_cooldown_body_has_canonical_message() {
        let body = GatewayError::all_cooldown_body();
        assert_eq!(body.code.as_deref(), Some("all_providers_cooldown"));
        assert!(body.message.contains("currently rate-limited"));
    }

    #[test]
    fn non_retriable_response_uses_given_status() {
        let err = GatewayError::NonRetriable {
            status: 422,
            message: "bad schema".into(),
        };
        let (status, body) = err.to_response();
        assert_eq!(status, 422);
        assert_eq!(body.message, "bad schema");
    }

    #[test]
    fn cancelled_maps_to_499() {
        let (status, _) = GatewayError::Cancelled.to_response();
        assert_eq!(status, 499);
    }
}
