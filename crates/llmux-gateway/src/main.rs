//! # llmux-gateway
//!
//! Dispatch gateway binary — loads configuration, initializes tracing, and
//! starts the HTTP ingress.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use llmux_server::GatewayServer;

/// The multi-provider dispatch gateway.
#[derive(Parser, Debug)]
#[command(name = "llmux-gateway", about = "Multi-provider LLM dispatch gateway")]
struct Cli {
    /// Override `server.hostname` from the config file.
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port` from the config file.
    #[arg(long)]
    port: Option<u16>,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Cli::parse();

    let mut config = llmux_config::load_config().context("failed to load gateway config")?;
    if let Some(host) = args.host {
        config.server.hostname = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let server = GatewayServer::try_new(config).context("failed to open signature store")?;
    let (addr, handle) = server.listen().await.context("failed to bind gateway listener")?;
    tracing::info!(%addr, "llmux-gateway listening");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    server.shutdown_token().cancel();
    handle.await.context("server task panicked")?;

    Ok(())
}
