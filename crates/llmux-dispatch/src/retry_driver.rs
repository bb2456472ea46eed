//! The streaming retry-loop state machine (C10 RetryDriver).
//!
//! [`dispatch_with_retry`] drives one inbound request through as many
//! upstream attempts as `handleUpstreamError` calls for: account rotation,
//! model/provider fallback switches, project-override toggles, and
//! thinking-strip retries, all without the caller needing to know which
//! happened. The actual HTTP call is abstracted behind [`UpstreamClient`] so
//! the loop is testable without a live network; `llmux-server` supplies the
//! `reqwest`-backed implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use llmux_accounts::AccountRotationManager;
use llmux_cooldown::CooldownManager;
use llmux_core::{Dialect, Provider};
use llmux_dialects::{self as dialects, TransformOptions};
use llmux_mapping::ModelMapping;
use llmux_router::{self as router, Resolution};
use serde_json::Value;

use crate::classify::{ErrorContext, RetryAction, classify_upstream_error};
use crate::retry_state::RetryState;

/// Maximum attempts a single request may make across model switches,
/// account rotations, and plain retries before giving up.
pub const MAX_ATTEMPTS: u32 = 8;

/// One upstream call the retry driver can issue.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// The provider to dispatch to on this attempt.
    pub provider: Provider,
    /// The model name to send upstream.
    pub model: String,
    /// The wire dialect `body` is already shaped as.
    pub dialect: Dialect,
    /// The fully transformed, fixed-up request body.
    pub body: Value,
    /// Which of the provider's credential slots to use.
    pub account_index: usize,
    /// Antigravity project override, if any.
    pub project_id: Option<String>,
    /// Antigravity endpoint fallback index.
    pub endpoint_index: usize,
}

/// A response body, shaped differently depending on whether the request
/// asked to stream.
pub enum UpstreamBody {
    /// A small, fully-buffered JSON body: every non-2xx response, and a
    /// non-streaming success.
    Buffered(Value),
    /// A streaming success: raw upstream bytes, not yet parsed into SSE
    /// frames — `llmux-stream` takes it from here.
    Stream(BoxStream<'static, Result<Bytes, TransportError>>),
}

impl fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamBody::Buffered(v) => f.debug_tuple("Buffered").field(v).finish(),
            UpstreamBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl UpstreamBody {
    /// The buffered JSON body, if this isn't a stream. Every error
    /// response is expected to be [`UpstreamBody::Buffered`].
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            UpstreamBody::Buffered(v) => Some(v),
            UpstreamBody::Stream(_) => None,
        }
    }
}

/// What an [`UpstreamClient`] hands back for one attempt.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// The upstream HTTP status code.
    pub status: u16,
    /// The response body.
    pub body: UpstreamBody,
    /// Parsed `Retry-After` header, if present.
    pub retry_after: Option<Duration>,
}

/// A transport-level failure distinct from a non-2xx upstream response
/// (connection refused, timeout, TLS failure, DNS failure, ...).
#[derive(Debug, thiserror::Error)]
#[error("upstream transport error: {0}")]
pub struct TransportError(pub String);

/// Abstraction over the actual HTTP call.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Issue one upstream attempt.
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

/// Everything the retry loop needs beyond the client and the request body
/// itself.
pub struct DriverContext<'a> {
    /// The upstream transport.
    pub client: &'a dyn UpstreamClient,
    /// Per-model cooldown tracker (C1).
    pub cooldowns: &'a CooldownManager,
    /// Per-account rotation tracker (C2).
    pub accounts: &'a AccountRotationManager,
    /// Configured model aliases, used to compute fallback candidates on a
    /// rate limit.
    pub mappings: &'a [ModelMapping],
    /// How many credential slots `provider` has configured.
    pub accounts_per_provider: fn(Provider) -> usize,
    /// The dialect the inbound request body already arrived in.
    pub source_dialect: Dialect,
    /// A fresh antigravity request id, generated once per attempt that
    /// needs one.
    pub request_id: fn() -> String,
    /// Maximum attempts before surrendering, overriding [`MAX_ATTEMPTS`].
    pub max_attempts: u32,
}

/// Terminal outcome of [`dispatch_with_retry`].
#[derive(Debug)]
pub enum DispatchOutcome {
    /// An attempt returned 2xx; here is its response and the final request
    /// actually sent (dialect/provider/model may have changed since the
    /// first attempt).
    Success {
        /// The successful response.
        response: UpstreamResponse,
        /// The request that produced it.
        request: UpstreamRequest,
    },
    /// Every candidate model/provider/account is currently in cooldown.
    AllCooldown,
    /// A non-retriable error surfaced; `message` is client-facing.
    Throw {
        /// The message to surface to the client.
        message: String,
    },
}

/// The wire dialect a provider's native API speaks.
#[must_use]
pub fn provider_dialect(provider: Provider) -> Dialect {
    match provider {
        Provider::Openai | Provider::OpenaiWeb => Dialect::OpenaiChat,
        Provider::Anthropic | Provider::OpencodeZen => Dialect::AnthropicMessages,
        Provider::Gemini | Provider::Antigravity => Dialect::GeminiGenerateContent,
    }
}

/// Run spec §4.10's retry loop for one inbound request.
pub async fn dispatch_with_retry(
    ctx: &DriverContext<'_>,
    resolution: Resolution,
    mut body: Value,
) -> DispatchOutcome {
    let original_provider = resolution.provider;
    let mut state = RetryState::new(resolution.model, resolution.provider);

    loop {
        state.attempt += 1;
        if state.attempt > ctx.max_attempts {
            return DispatchOutcome::Throw {
                message: "exceeded maximum retry attempts".to_string(),
            };
        }

        let dialect = provider_dialect(state.current_provider);
        let mut attempt_body = if dialect == ctx.source_dialect {
            body.clone()
        } else {
            dialects::transform_request(
                &body,
                ctx.source_dialect,
                dialect,
                &TransformOptions {
                    model: Some(state.current_model.clone()),
                    thinking_override: None,
                },
            )
        };
        apply_provider_fixup(state.current_provider, &mut attempt_body, &state, ctx.request_id);

        let request = UpstreamRequest {
            provider: state.current_provider,
            model: state.current_model.clone(),
            dialect,
            body: attempt_body,
            account_index: state.account_index,
            project_id: state.override_project_id.clone(),
            endpoint_index: state.antigravity_endpoint_index,
        };

        let response = match ctx.client.send(&request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, attempt = state.attempt, provider = request.provider.as_str(), "upstream transport error");
                if request.provider == Provider::Antigravity {
                    state.antigravity_endpoint_index += 1;
                    tokio::time::sleep(Duration::from_millis(200)).await;
                } else {
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                }
                continue;
            }
        };

        if (200..300).contains(&response.status) {
            router::handle_success(ctx.cooldowns, state.current_provider, &state.current_model);
            return DispatchOutcome::Success { response, request };
        }

        let n_accounts = (ctx.accounts_per_provider)(state.current_provider);
        let is_antigravity = state.current_provider == Provider::Antigravity;

        if response.status == 429 {
            router::handle_rate_limit(
                ctx.cooldowns,
                state.current_provider,
                &state.current_model,
                response.retry_after,
            );
            ctx.accounts.mark_rate_limited(
                state.current_provider,
                state.account_index,
                response.retry_after.unwrap_or(Duration::from_secs(30)),
            );
        }

        let fallback = (response.status == 429)
            .then(|| next_fallback(&state, ctx.mappings, ctx.cooldowns))
            .flatten();

        let action = classify_upstream_error(
            response.status,
            &ErrorContext {
                body: response.body.as_json(),
                retry_after: response.retry_after,
                has_fallback: fallback.is_some(),
                fallback: fallback.clone(),
                all_accounts_rate_limited: ctx.accounts.all_rate_limited(state.current_provider, n_accounts),
                account_rotation_available: ctx.accounts.next_available(state.current_provider, n_accounts).is_some(),
                is_antigravity,
            },
        );

        match action {
            RetryAction::Retry { delay } => {
                if let Some(next) = ctx.accounts.next_available(state.current_provider, n_accounts) {
                    state.account_index = next;
                }
                tokio::time::sleep(delay).await;
            }
            RetryAction::SwitchModel { new_model, new_provider } => {
                state.switch_model(new_model, new_provider);
                if state.model_or_provider_changed(original_provider) {
                    body = strip_all_signatures(&body);
                }
            }
            RetryAction::AllCooldown => return DispatchOutcome::AllCooldown,
            RetryAction::ToggleProjectAndRetry { project_id } => {
                state.override_project_id = Some(project_id);
            }
            RetryAction::StripThinkingAndRetry => {
                body = strip_thinking_from_body(&body, ctx.source_dialect);
            }
            RetryAction::Throw { message } => return DispatchOutcome::Throw { message },
        }
    }
}

/// Find the next mapped fallback for the originally-requested model that
/// isn't the candidate currently being attempted and isn't itself in
/// cooldown, re-resolving against the mapping table with the
/// just-recorded rate limit already reflected in `cooldowns`.
fn next_fallback(
    state: &RetryState,
    mappings: &[ModelMapping],
    cooldowns: &CooldownManager,
) -> Option<(String, Option<Provider>)> {
    let resolution = router::resolve_model(&state.original_model, mappings, cooldowns);
    if resolution.model == state.current_model && resolution.provider == state.current_provider {
        return None;
    }
    Some((resolution.model, Some(resolution.provider)))
}

/// Apply the post-transform body adjustments a given provider's wire format
/// needs beyond a plain dialect conversion (spec §4.8).
fn apply_provider_fixup(
    provider: Provider,
    body: &mut Value,
    state: &RetryState,
    request_id: fn() -> String,
) {
    match provider {
        Provider::OpencodeZen => {
            let thinking_enabled = body.get("thinking").is_some();
            dialects::fixups::opencode_zen_fixup(body, &state.current_model, thinking_enabled);
        }
        Provider::Antigravity => {
            let project = state
                .override_project_id
                .clone()
                .unwrap_or_else(|| "default".to_string());
            let wrapped = dialects::fixups::antigravity_wrap(
                &project,
                &state.current_model,
                body.clone(),
                &request_id(),
            );
            *body = wrapped;
        }
        Provider::OpenaiWeb => {
            let messages = body.get("messages").cloned().unwrap_or(Value::Array(vec![]));
            let tools = body.get("tools").cloned();
            let reasoning = body.get("reasoning").cloned();
            *body = dialects::fixups::build_codex_body(&state.current_model, messages, tools, reasoning);
        }
        Provider::Openai | Provider::Anthropic | Provider::Gemini => {}
    }
}

/// Recursively strip every `signature`/`thoughtSignature`/`thought_signature`
/// field from `value`, wherever it appears — the Anthropic `messages` array,
/// the antigravity `request.contents` wrapper, or anywhere else in the body.
/// Used when a fallback has just switched model or provider (spec §4.10 step
/// 6): a signature minted for the previous attempt's provider is never
/// admissible for the new one, so it must not be replayed upstream at all.
fn strip_all_signatures(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                if matches!(key.as_str(), "signature" | "thoughtSignature" | "thought_signature") {
                    continue;
                }
                out.insert(key.clone(), strip_all_signatures(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_all_signatures).collect()),
        other => other.clone(),
    }
}

fn strip_thinking_from_body(body: &Value, dialect: Dialect) -> Value {
    match dialect {
        Dialect::AnthropicMessages => {
            let system = body.get("system");
            let messages = body.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
            let canonical = dialects::anthropic::to_canonical(system, &messages);
            let (cleaned, _) = llmux_thinking::strip_thinking(canonical);
            let (system_out, wire_messages) = dialects::anthropic::from_canonical(&cleaned);
            let mut out = body.clone();
            if let Some(obj) = out.as_object_mut() {
                obj.insert("messages".to_string(), wire_messages);
                match system_out {
                    Some(s) => {
                        obj.insert("system".to_string(), s);
                    }
                    None => {
                        obj.remove("system");
                    }
                }
            }
            out
        }
        Dialect::GeminiGenerateContent => {
            let system = body.get("systemInstruction");
            let contents = body.get("contents").and_then(Value::as_array).cloned().unwrap_or_default();
            let canonical = dialects::gemini::to_canonical(system, &contents);
            let (cleaned, _) = llmux_thinking::strip_thinking(canonical);
            let (system_out, contents_out) = dialects::gemini::from_canonical(&cleaned);
            let mut out = body.clone();
            if let Some(obj) = out.as_object_mut() {
                obj.insert("contents".to_string(), contents_out);
                match system_out {
                    Some(s) => {
                        obj.insert("systemInstruction".to_string(), s);
                    }
                    None => {
                        obj.remove("systemInstruction");
                    }
                }
            }
            out
        }
        Dialect::OpenaiChat => body.clone(),
    }
}
