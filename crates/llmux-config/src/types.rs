//! Gateway configuration shape (spec §6).

use llmux_mapping::ModelMapping;
use serde::{Deserialize, Serialize};

/// Top-level gateway configuration, deep-merged from
/// `$HOME/.llmux/config.json` over these compiled defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP ingress settings.
    pub server: ServerConfig,
    /// Model routing settings.
    pub routing: RoutingConfig,
    /// Amp-compatibility passthrough settings.
    pub amp: AmpConfig,
    /// Cooldown/backoff tuning, configurable but defaulted to the spec's
    /// constants.
    pub cooldown: CooldownConfig,
    /// Streaming retry-driver tuning.
    pub retry: RetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            routing: RoutingConfig::default(),
            amp: AmpConfig::default(),
            cooldown: CooldownConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// HTTP ingress configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
    /// Listen hostname.
    pub hostname: String,
    /// CORS policy: disabled, fully open, or a fixed allow-list.
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8743,
            hostname: "localhost".to_string(),
            cors: CorsConfig::Enabled(true),
        }
    }
}

/// CORS policy: a bare bool enables/disables permissive CORS, or a list of
/// explicit allowed origins.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorsConfig {
    /// Blanket enable/disable.
    Enabled(bool),
    /// Explicit allow-list of origins.
    Origins(Vec<String>),
}

/// Model routing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    /// Configured model aliases, consulted by `llmux-mapping`/`llmux-router`.
    pub model_mapping: Vec<ModelMapping>,
    /// Default fallback provider order when a model has no configured
    /// mapping and no inferable provider.
    pub fallback_order: Vec<String>,
    /// Whether a 429 should trigger account/provider rotation.
    pub rotate_on429: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            model_mapping: Vec::new(),
            fallback_order: vec![
                "openai".to_string(),
                "anthropic".to_string(),
                "gemini".to_string(),
            ],
            rotate_on429: true,
        }
    }
}

/// Amp-compatibility passthrough settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmpConfig {
    /// Whether the Amp management passthrough surface is mounted.
    pub enabled: bool,
    /// Upstream base URL to proxy management requests to.
    pub upstream_url: Option<String>,
    /// API key used when proxying to `upstream_url`.
    pub upstream_api_key: Option<String>,
    /// Restrict the management surface to localhost-originated requests.
    pub restrict_management_to_localhost: bool,
    /// Additional model mappings layered on top of `routing.modelMapping`.
    pub model_mappings: Vec<ModelMapping>,
}

impl Default for AmpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            upstream_url: None,
            upstream_api_key: None,
            restrict_management_to_localhost: true,
            model_mappings: Vec::new(),
        }
    }
}

/// Cooldown/backoff constants, configurable overrides of the spec's
/// defaults (C1).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CooldownConfig {
    /// Base backoff in milliseconds before jitter.
    pub base_delay_ms: u64,
    /// Maximum backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 30_000,
            max_delay_ms: 900_000,
        }
    }
}

/// Streaming retry-driver constants (C10).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Maximum attempts across all rotation strategies before surrender.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 8 }
    }
}
