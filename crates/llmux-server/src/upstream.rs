//! The `reqwest`-backed [`UpstreamClient`] implementation.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use llmux_core::Provider;
use llmux_dispatch::{TransportError, UpstreamBody, UpstreamClient, UpstreamRequest, UpstreamResponse};

/// Per-provider base URL for the gateway's own outbound calls. Credential
/// acquisition (which account, which token) is out of scope here — it is
/// the credential store's job (see the spec's Non-goals); this client only
/// reads a per-provider bearer token from the environment.
#[must_use]
pub fn provider_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::Openai | Provider::OpenaiWeb => "https://api.openai.com/v1",
        Provider::Anthropic => "https://api.anthropic.com/v1",
        Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        Provider::Antigravity => "https://antigravity.googleapis.com/v1",
        Provider::OpencodeZen => "https://opencode.ai/zen/v1",
    }
}

fn provider_path(request: &UpstreamRequest) -> String {
    match request.provider {
        Provider::Openai | Provider::OpenaiWeb | Provider::OpencodeZen => "/chat/completions".to_string(),
        Provider::Anthropic => "/messages".to_string(),
        Provider::Gemini | Provider::Antigravity => {
            let action = if request.body.get("stream").and_then(serde_json::Value::as_bool) == Some(true) {
                "streamGenerateContent"
            } else {
                "generateContent"
            };
            format!("/models/{}:{action}", request.model)
        }
    }
}

fn api_key_env_var(provider: Provider) -> &'static str {
    match provider {
        Provider::Openai | Provider::OpenaiWeb => "OPENAI_API_KEY",
        Provider::Anthropic => "ANTHROPIC_API_KEY",
        Provider::Gemini | Provider::Antigravity => "GEMINI_API_KEY",
        Provider::OpencodeZen => "OPENCODE_ZEN_API_KEY",
    }
}

/// Issues one upstream attempt per [`UpstreamClient::send`] call, using a
/// single shared `reqwest::Client` (connection-pooled across attempts and
/// requests).
pub struct ReqwestUpstreamClient {
    http: reqwest::Client,
}

impl Default for ReqwestUpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestUpstreamClient {
    /// Build a client with a conservative per-attempt connect timeout.
    #[must_use]
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client configuration is static and valid");
        Self { http }
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let url = format!("{}{}", provider_base_url(request.provider), provider_path(request));
        let wants_stream = request.body.get("stream").and_then(serde_json::Value::as_bool) == Some(true);

        let mut builder = self.http.post(&url).json(&request.body);
        if let Ok(key) = env::var(api_key_env_var(request.provider)) {
            builder = match request.provider {
                Provider::Anthropic => builder.header("x-api-key", key).header("anthropic-version", "2023-06-01"),
                Provider::Gemini | Provider::Antigravity => builder.header("x-goog-api-key", key),
                _ => builder.bearer_auth(key),
            };
        }

        let response = builder.send().await.map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        if (200..300).contains(&status) && wants_stream {
            let byte_stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| TransportError(e.to_string())))
                .boxed();
            return Ok(UpstreamResponse {
                status,
                body: UpstreamBody::Stream(byte_stream),
                retry_after,
            });
        }

        let bytes = response.bytes().await.map_err(|e| TransportError(e.to_string()))?;
        let body = parse_json_or_wrap(&bytes);
        Ok(UpstreamResponse {
            status,
            body: UpstreamBody::Buffered(body),
            retry_after,
        })
    }
}

fn parse_json_or_wrap(bytes: &Bytes) -> serde_json::Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        serde_json::json!({ "error": { "message": String::from_utf8_lossy(bytes).to_string() } })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_selected_per_provider() {
        assert_eq!(provider_base_url(Provider::Openai), "https://api.openai.com/v1");
        assert_eq!(provider_base_url(Provider::Anthropic), "https://api.anthropic.com/v1");
    }

    #[test]
    fn unparseable_body_is_wrapped_as_error_message() {
        let bytes = Bytes::from_static(b"plain text failure");
        let value = parse_json_or_wrap(&bytes);
        assert_eq!(value["error"]["message"], "plain text failure");
    }

    #[test]
    fn gemini_path_selects_stream_action_when_requested() {
        let request = UpstreamRequest {
            provider: Provider::Gemini,
            model: "gemini-1.5-pro".to_string(),
            dialect: llmux_core::Dialect::GeminiGenerateContent,
            body: serde_json::json!({ "stream": true }),
            account_index: 0,
            project_id: None,
            endpoint_index: 0,
        };
        assert_eq!(provider_path(&request), "/models/gemini-1.5-pro:streamGenerateContent");
    }
}
