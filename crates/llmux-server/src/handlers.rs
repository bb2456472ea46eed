//! The dialect-ingress HTTP handlers (C11 Dispatcher's HTTP side).

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use llmux_core::part::{Message, Part, Role};
use llmux_core::{Dialect, GatewayError, ModelFamily, Provider};
use llmux_dispatch::{
    DispatchOutcome, DriverContext, UpstreamBody, dispatcher,
};
use llmux_router::resolve_model;
use llmux_stream::{FrameOutcome, SseFrame, SseParserOptions, StreamEvent, StreamState, parse_sse_lines, process_frame};
use llmux_thinking::{ThinkingRecoveryEngine, build_signature_session_key, extract_conversation_key};
use serde_json::Value;
use uuid::Uuid;

use crate::pipeline::{persist_signatures, prepare_body};
use crate::state::AppState;
use crate::upstream::ReqwestUpstreamClient;

fn request_id() -> String {
    Uuid::now_v7().to_string()
}

/// `POST /v1/chat/completions` — OpenAI Chat Completions ingress.
pub async fn chat_completions(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    dispatch(&state, "/v1/chat/completions", Dialect::OpenaiChat, None, body).await
}

/// `POST /v1/messages` — Anthropic Messages ingress.
pub async fn messages(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    dispatch(&state, "/v1/messages", Dialect::AnthropicMessages, None, body).await
}

/// `POST /v1/responses` — OpenAI Responses ingress. Parsed with the same
/// canonicalizer as Chat Completions; the Responses-specific `input`/
/// `output` wire shape is left to `llmux-dialects::openai`'s existing
/// message-array handling, which already tolerates either shape.
pub async fn responses(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    dispatch(&state, "/v1/responses", Dialect::OpenaiChat, None, body).await
}

/// `POST /v1beta/models/*action` — Gemini-style ingress (`<model>:<method>`
/// already captured in `path`).
pub async fn gemini_generate(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let full_path = format!("/v1beta/models/{path}");
    dispatch(&state, &full_path, Dialect::GeminiGenerateContent, None, body).await
}

/// Provider-scoped variant of [`chat_completions`]: `/api/provider/:provider/v1/chat/completions`.
pub async fn provider_chat_completions(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    match Provider::parse(&provider) {
        Some(p) => dispatch(&state, "/v1/chat/completions", Dialect::OpenaiChat, Some(p), body).await,
        None => unknown_provider_response(&provider),
    }
}

/// Provider-scoped variant of [`messages`]: `/api/provider/:provider/v1/messages`.
pub async fn provider_messages(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    match Provider::parse(&provider) {
        Some(p) => dispatch(&state, "/v1/messages", Dialect::AnthropicMessages, Some(p), body).await,
        None => unknown_provider_response(&provider),
    }
}

/// Provider-scoped variant of [`responses`]: `/api/provider/:provider/v1/responses`.
pub async fn provider_responses(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    match Provider::parse(&provider) {
        Some(p) => dispatch(&state, "/v1/responses", Dialect::OpenaiChat, Some(p), body).await,
        None => unknown_provider_response(&provider),
    }
}

/// Provider-scoped variant of [`gemini_generate`]: `/api/provider/:provider/v1beta/models/*action`.
pub async fn provider_gemini_generate(
    State(state): State<AppState>,
    Path((provider, path)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    match Provider::parse(&provider) {
        Some(p) => {
            let full_path = format!("/v1beta/models/{path}");
            dispatch(&state, &full_path, Dialect::GeminiGenerateContent, Some(p), body).await
        }
        None => unknown_provider_response(&provider),
    }
}

/// `GET /api/provider/:provider/v1/models` — static model listing for the
/// named provider, keyed off the configured model mapping's right-hand
/// sides (the actual provider model catalog is out of scope; see the
/// Non-goals on credential/account management).
pub async fn provider_models(State(state): State<AppState>, Path(provider): Path<String>) -> Response {
    let Some(provider) = Provider::parse(&provider) else {
        return unknown_provider_response(&provider);
    };
    let models: Vec<&str> = state
        .config
        .routing
        .model_mapping
        .iter()
        .filter_map(|m| match &m.to {
            llmux_mapping::ToSpec::One(s) => Some(s.as_str()),
            llmux_mapping::ToSpec::Many(v) => v.first().map(String::as_str),
        })
        .collect();
    Json(serde_json::json!({ "provider": provider.as_str(), "models": models })).into_response()
}

fn unknown_provider_response(provider: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": { "message": format!("unknown provider '{provider}'") } })),
    )
        .into_response()
}

/// The shared C11 pipeline: extract the model, resolve it, run the retry
/// loop, and translate the terminal outcome into an HTTP response.
async fn dispatch(
    state: &AppState,
    path: &str,
    source_dialect: Dialect,
    provider_override: Option<Provider>,
    body: Value,
) -> Response {
    let Some(requested_model) = dispatcher::extract_model(path, &body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": { "message": "no model specified" } })),
        )
            .into_response();
    };

    let mut resolution = resolve_model(&requested_model, &state.config.routing.model_mapping, &state.cooldowns);
    if let Some(provider) = provider_override {
        resolution.provider = provider;
    }
    let provider = resolution.provider;

    let wants_stream = dispatcher::wants_streaming(&body);
    let conv_key = extract_conversation_key(&body, "", "");
    let session_key = build_signature_session_key(
        "llmux",
        &resolution.model,
        Some(resolution.provider.as_str()),
        conv_key.as_deref(),
    );
    let family = resolution.provider.family();
    let body = prepare_body(state, source_dialect, &resolution, body);

    let client = ReqwestUpstreamClient::new();
    let ctx = DriverContext {
        client: &client,
        cooldowns: &state.cooldowns,
        accounts: &state.accounts,
        mappings: &state.config.routing.model_mapping,
        accounts_per_provider: |_| 1,
        source_dialect,
        request_id,
        max_attempts: state.config.retry.max_attempts,
    };

    match llmux_dispatch::dispatch_with_retry(&ctx, resolution, body).await {
        DispatchOutcome::Success { response, request } => {
            if wants_stream {
                stream_response(state, provider, family, &session_key, request.dialect, source_dialect, response)
            } else {
                buffered_response(state, provider, response)
            }
        }
        DispatchOutcome::AllCooldown => {
            let body = GatewayError::all_cooldown_body();
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
        DispatchOutcome::Throw { message } => {
            let err = GatewayError::NonRetriable { status: 500, message };
            let (status, body) = err.to_response();
            (StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(body)).into_response()
        }
    }
}

fn buffered_response(state: &AppState, provider: Provider, response: llmux_dispatch::UpstreamResponse) -> Response {
    match response.body {
        UpstreamBody::Buffered(value) => {
            persist_signatures(state, provider, &value);
            Json(value).into_response()
        }
        UpstreamBody::Stream(_) => {
            // A non-streaming request never produces a streaming upstream
            // body (see `ReqwestUpstreamClient::send`); treat it as empty.
            Json(Value::Null).into_response()
        }
    }
}

/// Pipe a successful streaming upstream response to the client. Same-dialect
/// attempts are forwarded byte-for-byte — but teed through the same SSE
/// frame parser the cross-dialect branch uses, so that a signature minted
/// mid-stream still reaches the signature cache (C7) and store (C6) even
/// though the client never sees a re-synthesized body. A cross-dialect
/// attempt is fully consumed into a canonical transcript and re-emitted as
/// one complete, non-streaming message in the client's dialect — a
/// deliberate simplification over building three incremental wire
/// serializers (see `DESIGN.md`).
fn stream_response(
    state: &AppState,
    provider: Provider,
    family: ModelFamily,
    session_key: &str,
    upstream_dialect: Dialect,
    client_dialect: Dialect,
    response: llmux_dispatch::UpstreamResponse,
) -> Response {
    let UpstreamBody::Stream(byte_stream) = response.body else {
        return buffered_response(state, provider, response);
    };

    if upstream_dialect == client_dialect {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<bytes::Bytes>();
        let gateway_state = state.clone();
        let session_key = session_key.to_string();
        tokio::spawn(async move {
            capture_streaming_signatures(&gateway_state, provider, family, &session_key, upstream_dialect, rx).await;
        });

        let tee = byte_stream.inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                let _ = tx.send(chunk.clone());
            }
        });
        let body = Body::from_stream(tee);
        return Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    let gateway_state = state.clone();
    let session_key = session_key.to_string();
    let body = Body::from_stream(async_stream::stream! {
        let mut stream_state = StreamState::new(&request_id());
        let mut thinking_buffer = String::new();
        let frames = parse_sse_lines(byte_stream, SseParserOptions::default());
        tokio::pin!(frames);
        while let Some(frame) = frames.next().await {
            match frame {
                SseFrame::Data(data) => {
                    // Anthropic's data payload mirrors its own `event:` name
                    // in a top-level `type` field, so it can be recovered
                    // without the SSE layer having to thread `event:` lines
                    // through separately.
                    let event_type = serde_json::from_str::<Value>(&data)
                        .ok()
                        .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string));
                    if let FrameOutcome::Events(events) =
                        process_frame(upstream_dialect, event_type.as_deref(), &data, &mut stream_state)
                    {
                        capture_signature_events(&gateway_state.thinking, &session_key, family, &mut thinking_buffer, &events);
                    }
                }
                SseFrame::Done => break,
            }
        }
        let value = final_message_in_dialect(client_dialect, &stream_state);
        persist_signatures(&gateway_state, provider, &value);
        yield Ok::<_, std::io::Error>(bytes::Bytes::from(value.to_string()));
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Drain a teed copy of the raw upstream byte stream through the same SSE
/// parser the cross-dialect branch uses, purely for the side effect of
/// feeding the thinking engine and signature store — the client-facing copy
/// of the stream is untouched by this.
async fn capture_streaming_signatures(
    state: &AppState,
    provider: Provider,
    family: ModelFamily,
    session_key: &str,
    dialect: Dialect,
    rx: tokio::sync::mpsc::UnboundedReceiver<bytes::Bytes>,
) {
    let mut stream_state = StreamState::new(&request_id());
    let mut thinking_buffer = String::new();
    let byte_stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx).map(Ok::<_, std::io::Error>);
    let frames = parse_sse_lines(byte_stream, SseParserOptions::default());
    tokio::pin!(frames);
    while let Some(frame) = frames.next().await {
        match frame {
            SseFrame::Data(data) => {
                let event_type = serde_json::from_str::<Value>(&data)
                    .ok()
                    .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string));
                if let FrameOutcome::Events(events) = process_frame(dialect, event_type.as_deref(), &data, &mut stream_state) {
                    capture_signature_events(&state.thinking, session_key, family, &mut thinking_buffer, &events);
                }
            }
            SseFrame::Done => break,
        }
    }
    let value = final_message_in_dialect(dialect, &stream_state);
    persist_signatures(state, provider, &value);
}

/// Feed a frame's events through the thinking engine's streaming cache path
/// (C7): a `ThinkingDelta` accumulates into `thinking_buffer`, and a
/// `ThinkingEnd` that carries a signature persists `(text, signature)` into
/// the session layer and signature cache so a later turn's inject can find
/// it without waiting for `persist_signatures` to run against the store.
fn capture_signature_events(
    engine: &ThinkingRecoveryEngine,
    session_key: &str,
    family: ModelFamily,
    thinking_buffer: &mut String,
    events: &[StreamEvent],
) {
    for event in events {
        match event {
            StreamEvent::ThinkingDelta { delta } => {
                engine.cache_signature_from_chunk(session_key, family, thinking_buffer, delta, None);
            }
            StreamEvent::ThinkingEnd { signature, .. } => {
                engine.cache_signature_from_chunk(session_key, family, thinking_buffer, "", signature.as_deref());
            }
            _ => {}
        }
    }
}


fn final_message_in_dialect(dialect: Dialect, state: &StreamState) -> Value {
    let mut parts = Vec::new();
    if !state.accumulated_thinking.is_empty() {
        parts.push(Part::Thinking {
            text: state.accumulated_thinking.clone(),
            signature: state.thinking_signature.clone(),
        });
    }
    if !state.accumulated_text.is_empty() {
        parts.push(Part::Text {
            text: state.accumulated_text.clone(),
        });
    }
    for call in state.tool_calls.values() {
        parts.push(Part::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: serde_json::from_str(&call.arguments_json).unwrap_or(Value::Object(Default::default())),
            thought_signature: call.thought_signature.clone(),
        });
    }
    let message = Message {
        role: Role::Assistant,
        parts,
    };

    match dialect {
        Dialect::AnthropicMessages => {
            let (_, wire) = llmux_dialects::anthropic::from_canonical(std::slice::from_ref(&message));
            serde_json::json!({ "role": "assistant", "content": wire })
        }
        Dialect::OpenaiChat => {
            let wire = llmux_dialects::openai::from_canonical(std::slice::from_ref(&message));
            serde_json::json!({ "choices": [{ "message": wire }] })
        }
        Dialect::GeminiGenerateContent => {
            let (_, contents) = llmux_dialects::gemini::from_canonical(std::slice::from_ref(&message));
            serde_json::json!({ "candidates": [{ "content": contents }] })
        }
    }
}
