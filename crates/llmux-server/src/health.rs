//! `GET /health`, `GET /providers`, `GET /status`.

use axum::extract::State;
use axum::Json;
use llmux_core::Provider;
use serde::Serialize;

use crate::state::AppState;

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` once the process is accepting connections.
    pub status: String,
    /// Seconds since the process started.
    pub uptime_secs: u64,
}

/// One provider's current availability, for `GET /providers`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// The provider's wire name.
    pub provider: String,
    /// Whether at least one of its credential slots is currently usable.
    pub available: bool,
}

/// `GET /status` response body: health plus a cooldown snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Same as `/health`.
    pub status: String,
    /// Seconds since the process started.
    pub uptime_secs: u64,
    /// Every key currently tracked by the cooldown manager.
    pub cooldowns: Vec<CooldownEntry>,
}

/// One tracked cooldown key, for `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct CooldownEntry {
    /// `"<provider>:<model>"`.
    pub key: String,
    /// Current exponential-backoff level.
    pub backoff_level: u32,
}

/// `GET /health` — minimal liveness probe.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// `GET /providers` — per-provider availability, derived from account
/// rotation state.
pub async fn providers_handler(State(state): State<AppState>) -> Json<Vec<ProviderStatus>> {
    let statuses = Provider::all()
        .iter()
        .map(|&provider| ProviderStatus {
            provider: provider.as_str().to_string(),
            available: state.accounts.next_available(provider, state.accounts_per_provider(provider)).is_some(),
        })
        .collect();
    Json(statuses)
}

/// `GET /status` — health plus a cooldown snapshot, for operators.
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let cooldowns = state
        .cooldowns
        .snapshot()
        .into_iter()
        .map(|s| CooldownEntry {
            key: s.key,
            backoff_level: s.backoff_level,
        })
        .collect();
    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        cooldowns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmux_config::GatewayConfig;

    #[tokio::test]
    async fn health_reports_ok() {
        let state = AppState::new(GatewayConfig::default());
        let Json(resp) = health_handler(State(state)).await;
        assert_eq!(resp.status, "ok");
    }

    #[tokio::test]
    async fn providers_lists_every_known_provider() {
        let state = AppState::new(GatewayConfig::default());
        let Json(resp) = providers_handler(State(state)).await;
        assert_eq!(resp.len(), Provider::all().len());
    }

    #[tokio::test]
    async fn status_has_empty_cooldowns_initially() {
        let state = AppState::new(GatewayConfig::default());
        let Json(resp) = status_handler(State(state)).await;
        assert!(resp.cooldowns.is_empty());
    }
}
