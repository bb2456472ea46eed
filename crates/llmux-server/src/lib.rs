//! Axum HTTP ingress for the dispatch gateway (C11's HTTP half).
//!
//! [`state`] holds the shared, process-wide managers; [`upstream`] is the
//! `reqwest`-backed [`llmux_dispatch::UpstreamClient`]; [`handlers`] wires a
//! request through [`llmux_dispatch::dispatch_with_retry`]; [`router`]
//! assembles the route surface and [`GatewayServer`] binds and serves it.

#![deny(unsafe_code)]

pub mod handlers;
pub mod health;
pub mod pipeline;
pub mod router;
pub mod state;
pub mod upstream;

use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use llmux_config::GatewayConfig;
use llmux_signatures::SignatureStoreError;

pub use state::AppState;
pub use upstream::ReqwestUpstreamClient;

/// Owns the gateway's shared state and binds it to a TCP listener.
pub struct GatewayServer {
    state: AppState,
    shutdown: CancellationToken,
}

impl GatewayServer {
    /// Construct a server backed by the persistent, file-backed signature
    /// store at `$HOME/.llmux/signatures.db`. This is what production boot
    /// (`llmux-gateway`) should use.
    ///
    /// # Errors
    ///
    /// Propagates any failure opening or migrating the signature store.
    pub fn try_new(config: GatewayConfig) -> Result<Self, SignatureStoreError> {
        Ok(Self {
            state: AppState::try_new(config)?,
            shutdown: CancellationToken::new(),
        })
    }

    /// Construct a server with fresh in-process state backed by an
    /// in-memory signature store. Used by tests that don't want a
    /// `$HOME/.llmux` side effect.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            state: AppState::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// The token that, when cancelled, triggers graceful shutdown.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind to `config.server`'s host:port and start serving. Returns the
    /// bound address and a join handle for the server task.
    #[instrument(skip_all, fields(host = %self.state.config.server.hostname, port = self.state.config.server.port))]
    pub async fn listen(&self) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.state.config.server.hostname, self.state.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;
        info!(addr = %bound_addr, "gateway listening");

        let router = router::build_router(self.state.clone());
        let shutdown = self.shutdown.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    info!("gateway shutdown initiated");
                })
                .await;
            info!(uptime_secs = start.elapsed().as_secs(), "gateway shutdown complete");
        });

        Ok((bound_addr, handle))
    }

    /// The shared application state, for tests that want direct access.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_to_an_ephemeral_port() {
        let mut config = GatewayConfig::default();
        config.server.hostname = "127.0.0.1".to_string();
        config.server.port = 0;
        let server = GatewayServer::new(config);

        let (addr, handle) = server.listen().await.expect("bind should succeed");
        assert_ne!(addr.port(), 0);

        server.shutdown_token().cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn health_reachable_once_listening() {
        let mut config = GatewayConfig::default();
        config.server.hostname = "127.0.0.1".to_string();
        config.server.port = 0;
        let server = GatewayServer::new(config);
        let (addr, handle) = server.listen().await.expect("bind should succeed");

        let resp = reqwest::get(format!("http://{addr}/health")).await.expect("request should succeed");
        assert!(resp.status().is_success());

        server.shutdown_token().cancel();
        let _ = handle.await;
    }
}
