//! Per-key rate-limit cooldown tracking (spec component C1).
//!
//! A [`CooldownManager`] tracks, for any string key (conventionally
//! `"provider:model"`), whether that key is currently rate-limited and, if
//! so, when it becomes available again. Repeated rate-limits on the same key
//! without an explicit upstream-provided duration back off exponentially.

#![deny(unsafe_code)]

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

/// Base cooldown duration for an implicit (no `retryAfterMs`) rate limit.
pub const BASE: Duration = Duration::from_secs(30);
/// Maximum cooldown duration, regardless of backoff level.
pub const MAX: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Debug)]
struct Entry {
    reset_at: Instant,
    backoff_level: u32,
}

/// Tracks per-key cooldown state with exponential backoff.
///
/// Cheaply cloneable: the map itself is an `Arc`-backed `DashMap`, so a
/// `CooldownManager` can be shared across tasks by cloning it rather than
/// wrapping it in an `Arc` at the call site.
#[derive(Clone, Debug, Default)]
pub struct CooldownManager {
    entries: std::sync::Arc<DashMap<String, Entry>>,
}

/// A snapshot of one key's cooldown state, for observability.
#[derive(Clone, Debug)]
pub struct CooldownSnapshot {
    /// The cooldown key.
    pub key: String,
    /// When this key becomes available again.
    pub reset_at: Instant,
    /// The current exponential-backoff level.
    pub backoff_level: u32,
}

impl CooldownManager {
    /// Create an empty cooldown manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rate limit on `key`. If `retry_after` is `Some` and
    /// non-zero, that duration (plus jitter) is used verbatim and the
    /// backoff level is left untouched. Otherwise the duration is computed
    /// from the exponential backoff formula and the level is incremented.
    ///
    /// Returns the duration actually applied (for logging).
    pub fn mark_rate_limited(&self, key: &str, retry_after: Option<Duration>) -> Duration {
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            reset_at: Instant::now(),
            backoff_level: 0,
        });

        let duration = match retry_after.filter(|d| !d.is_zero()) {
            Some(explicit) => with_jitter(explicit),
            None => {
                entry.backoff_level += 1;
                with_jitter(backoff_duration(entry.backoff_level))
            }
        };

        entry.reset_at = Instant::now() + duration;
        tracing::debug!(
            key,
            duration_ms = duration.as_millis() as u64,
            backoff_level = entry.backoff_level,
            explicit = retry_after.is_some(),
            "cooldown applied"
        );
        duration
    }

    /// True if `key` has no cooldown entry, or its cooldown has expired.
    #[must_use]
    pub fn is_available(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(entry) => Instant::now() >= entry.reset_at,
            None => true,
        }
    }

    /// When `key` becomes available again. `None` if it has no entry (i.e.
    /// it is available now and always has been).
    #[must_use]
    pub fn reset_time(&self, key: &str) -> Option<Instant> {
        self.entries.get(key).map(|e| e.reset_at)
    }

    /// Clear `key`'s cooldown entirely, including its backoff level.
    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Snapshot every tracked key's current state, for diagnostics endpoints.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CooldownSnapshot> {
        self.entries
            .iter()
            .map(|kv| CooldownSnapshot {
                key: kv.key().clone(),
                reset_at: kv.value().reset_at,
                backoff_level: kv.value().backoff_level,
            })
            .collect()
    }
}

/// `min(BASE * 2^level, MAX)`, before jitter.
fn backoff_duration(level: u32) -> Duration {
    let multiplier = 2u64.saturating_pow(level.saturating_sub(1).min(32));
    let scaled = BASE.saturating_mul(multiplier as u32);
    scaled.min(MAX)
}

/// Apply 0-10% positive jitter.
fn with_jitter(base: Duration) -> Duration {
    let jitter_frac = rand::rng().random::<f64>() * 0.1;
    base.mul_f64(1.0 + jitter_frac)
}
