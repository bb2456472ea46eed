//! Route assembly and the gateway's management passthrough proxy.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{any, get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::health;
use crate::state::AppState;

#[derive(Clone)]
struct UuidV7RequestId;

impl MakeRequestId for UuidV7RequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        axum::http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Assemble the full ingress router (spec §6's route surface) and apply the
/// same outer layering `tron-server` uses: panic catching, compression, a
/// request body cap, a request timeout, and a propagated request id.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/messages", post(handlers::messages))
        .route("/v1/responses", post(handlers::responses))
        .route("/v1beta/models/{*action}", post(handlers::gemini_generate))
        .route(
            "/api/provider/{provider}/v1/chat/completions",
            post(handlers::provider_chat_completions),
        )
        .route("/api/provider/{provider}/v1/messages", post(handlers::provider_messages))
        .route("/api/provider/{provider}/v1/responses", post(handlers::provider_responses))
        .route(
            "/api/provider/{provider}/v1beta/models/{*action}",
            post(handlers::provider_gemini_generate),
        )
        .route("/api/provider/{provider}/v1/models", get(handlers::provider_models))
        .route("/health", get(health::health_handler))
        .route("/providers", get(health::providers_handler))
        .route("/status", get(health::status_handler))
        .route("/threads.rss", get(management_proxy))
        .route("/news.rss", get(management_proxy))
        .route("/threads", get(html_redirect_or_proxy))
        .route("/docs", get(html_redirect_or_proxy))
        .route("/settings", get(html_redirect_or_proxy))
        .route("/auth", get(html_redirect_or_proxy))
        .route("/api/internal/{*path}", any(management_proxy))
        .route("/api/user/{*path}", any(management_proxy))
        .route("/api/auth/{*path}", any(management_proxy))
        .route("/api/meta/{*path}", any(management_proxy))
        .route("/api/ads/{*path}", any(management_proxy))
        .route("/api/telemetry/{*path}", any(management_proxy))
        .route("/api/threads/{*path}", any(management_proxy))
        .route("/api/otel/{*path}", any(management_proxy))
        .route("/api/tab/{*path}", any(management_proxy))
        .with_state(state)
        // Outermost layers execute first on request, last on response.
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(120)))
        .layer(SetRequestIdLayer::x_request_id(UuidV7RequestId))
        .layer(PropagateRequestIdLayer::x_request_id())
}

/// `GET /threads|/docs|/settings|/auth` — 307 to the Amp upstream when the
/// client wants HTML, otherwise fall through to the JSON management proxy.
async fn html_redirect_or_proxy(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request,
) -> Response {
    let wants_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"));

    if wants_html {
        if let Some(upstream) = state.config.amp.upstream_url.as_deref() {
            return Redirect::temporary(&format!("{upstream}{}", request.uri().path())).into_response();
        }
    }
    management_proxy(State(state), ConnectInfo(peer), request).await
}

/// Forwards Amp management-surface requests to the configured upstream.
/// Disabled entirely unless `amp.enabled`; out of scope for anything beyond
/// byte-for-byte passthrough (no request rewriting, no response caching).
/// When `amp.restrict_management_to_localhost` is set (the default), this
/// passthrough — which reaches `/api/auth`, `/api/internal`, `/api/user` —
/// refuses any peer that isn't loopback, since it carries no auth of its
/// own beyond whatever the Amp upstream itself enforces.
async fn management_proxy(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    if !state.config.amp.enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    if state.config.amp.restrict_management_to_localhost && !is_loopback(peer.ip()) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let Some(upstream) = state.config.amp.upstream_url.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();
    let body = match axum::body::to_bytes(request.into_body(), 32 * 1024 * 1024).await {
        Ok(b) => b,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match proxy_to_upstream(&state, &upstream, &method, &uri, &headers, body).await {
        Ok(response) => response,
        Err(_) => StatusCode::BAD_GATEWAY.into_response(),
    }
}

async fn proxy_to_upstream(
    state: &AppState,
    upstream: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, reqwest::Error> {
    let url = format!("{upstream}{}", uri.path_and_query().map(|p| p.as_str()).unwrap_or(""));
    let mut builder = reqwest::Client::new().request(method.clone(), &url);
    for (name, value) in headers {
        if name == header::HOST {
            continue;
        }
        builder = builder.header(name.clone(), value.clone());
    }
    if let Some(key) = &state.config.amp.upstream_api_key {
        builder = builder.bearer_auth(key);
    }
    let upstream_response = builder.body(body).send().await?;
    let status = StatusCode::from_u16(upstream_response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream_response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned();
    let bytes = upstream_response.bytes().await?;

    let mut response = Response::builder().status(status);
    if let Some(content_type) = content_type {
        response = response.header(header::CONTENT_TYPE, content_type);
    }
    Ok(response.body(Body::from(bytes)).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

fn is_loopback(ip: IpAddr) -> bool {
    ip.is_loopback()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_addresses_pass() {
        assert!(is_loopback("127.0.0.1".parse().unwrap()));
        assert!(is_loopback("::1".parse().unwrap()));
    }

    #[test]
    fn remote_addresses_are_rejected() {
        assert!(!is_loopback("10.0.0.5".parse().unwrap()));
        assert!(!is_loopback("203.0.113.1".parse().unwrap()));
    }
}
