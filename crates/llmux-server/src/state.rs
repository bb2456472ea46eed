//! Shared state handed to every Axum handler.

use std::sync::Arc;
use std::time::Instant;

use llmux_accounts::AccountRotationManager;
use llmux_config::GatewayConfig;
use llmux_cooldown::CooldownManager;
use llmux_core::Provider;
use llmux_signatures::sqlite::{ConnectionConfig, new_file, new_in_memory, run_migrations};
use llmux_signatures::{SignatureCache, SignatureStore, SignatureStoreError};
use llmux_thinking::ThinkingRecoveryEngine;

use crate::upstream::ReqwestUpstreamClient;

/// Everything a request handler needs, cheaply cloneable (every field is
/// itself an `Arc` or an already-`Clone`-cheap manager).
#[derive(Clone)]
pub struct AppState {
    /// Loaded gateway configuration.
    pub config: Arc<GatewayConfig>,
    /// Per-model cooldown tracker (C1).
    pub cooldowns: CooldownManager,
    /// Per-account rotation tracker (C2).
    pub accounts: AccountRotationManager,
    /// Persistent, project-scoped signature registry (C6).
    pub signatures: SignatureStore,
    /// Thinking strip/inject/recovery engine (C7).
    pub thinking: Arc<ThinkingRecoveryEngine>,
    /// The `reqwest`-backed upstream client.
    pub upstream: Arc<ReqwestUpstreamClient>,
    /// Process start time, for `/health`.
    pub start_time: Instant,
}

impl AppState {
    /// Assemble fresh state from a loaded configuration, opening (and
    /// migrating) the signature store at `$HOME/.llmux/signatures.db`.
    ///
    /// # Errors
    ///
    /// Propagates any failure opening or migrating the `SQLite` file.
    pub fn try_new(config: GatewayConfig) -> Result<Self, SignatureStoreError> {
        let path = signatures_db_path();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let pool = new_file(&path.to_string_lossy(), &ConnectionConfig::default())?;
        {
            let conn = pool.get()?;
            run_migrations(&conn)?;
        }
        Ok(Self::from_signature_pool(config, SignatureStore::new(pool)))
    }

    /// Assemble state backed by an in-memory, already-migrated signature
    /// store. Used by tests that don't want a `$HOME/.llmux` side effect.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let pool = new_in_memory(&ConnectionConfig::default()).expect("in-memory sqlite pool");
        {
            let conn = pool.get().expect("pool checkout");
            run_migrations(&conn).expect("in-memory migrations");
        }
        Self::from_signature_pool(config, SignatureStore::new(pool))
    }

    fn from_signature_pool(config: GatewayConfig, signatures: SignatureStore) -> Self {
        Self {
            config: Arc::new(config),
            cooldowns: CooldownManager::new(),
            accounts: AccountRotationManager::new(),
            signatures,
            thinking: Arc::new(ThinkingRecoveryEngine::new(SignatureCache::new())),
            upstream: Arc::new(ReqwestUpstreamClient::new()),
            start_time: Instant::now(),
        }
    }

    /// How many credential slots are configured for `provider`. The
    /// account store proper is out of scope (spec §4.2's Non-goals); this
    /// gateway treats every provider as single-account unless the loaded
    /// config says otherwise via `routing.fallbackOrder` entries repeated
    /// per account — reserved for a future credential-store integration.
    #[must_use]
    pub fn accounts_per_provider(&self, _provider: Provider) -> usize {
        1
    }
}

fn signatures_db_path() -> std::path::PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".to_string());
    std::path::PathBuf::from(home).join(".llmux").join("signatures.db")
}
