//! Per-provider account rotation (spec component C2).
//!
//! Each provider has an ordered list of credential slots, indexed `0..n`.
//! [`AccountRotationManager`] tracks which slots are currently rate-limited
//! and picks the next one to try.

#![deny(unsafe_code)]

use std::time::{Duration, Instant};

use dashmap::DashMap;
use llmux_core::Provider;

/// Tracks per-provider, per-account-index rate-limit state.
#[derive(Clone, Debug, Default)]
pub struct AccountRotationManager {
    // (provider, index) -> rate_limited_until
    entries: std::sync::Arc<DashMap<(Provider, usize), Instant>>,
}

impl AccountRotationManager {
    /// Create an empty rotation manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark account `index` of `provider` rate-limited for `duration`.
    pub fn mark_rate_limited(&self, provider: Provider, index: usize, duration: Duration) {
        self.entries
            .insert((provider, index), Instant::now() + duration);
        tracing::debug!(
            provider = provider.as_str(),
            index,
            duration_ms = duration.as_millis() as u64,
            "account rate limited"
        );
    }

    /// Return the first available account index for `provider` out of `n`
    /// total accounts, or the index with the earliest expiry if all `n` are
    /// currently rate-limited. Returns `None` if `n == 0`.
    #[must_use]
    pub fn next_available(&self, provider: Provider, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        let now = Instant::now();
        let mut earliest: Option<(usize, Instant)> = None;
        for idx in 0..n {
            match self.entries.get(&(provider, idx)) {
                None => return Some(idx),
                Some(until) if *until <= now => return Some(idx),
                Some(until) => {
                    if earliest.is_none_or(|(_, e)| *until < e) {
                        earliest = Some((idx, *until));
                    }
                }
            }
        }
        earliest.map(|(idx, _)| idx)
    }

    /// True iff all `n` accounts for `provider` are currently rate-limited.
    #[must_use]
    pub fn all_rate_limited(&self, provider: Provider, n: usize) -> bool {
        if n == 0 {
            return false;
        }
        let now = Instant::now();
        (0..n).all(|idx| {
            self.entries
                .get(&(provider, idx))
                .is_some_and(|until| *until > now)
        })
    }

    /// The minimum wait time in milliseconds until any of `provider`'s `n`
    /// accounts becomes available; `0` if at least one already is.
    #[must_use]
    pub fn min_wait_ms(&self, provider: Provider, n: usize) -> u64 {
        if n == 0 {
            return 0;
        }
        let now = Instant::now();
        let mut min_wait = None;
        for idx in 0..n {
            match self.entries.get(&(provider, idx)) {
                None => return 0,
                Some(until) if *until <= now => return 0,
                Some(until) => {
                    let wait = until.saturating_duration_since(now).as_millis() as u64;
                    min_wait = Some(min_wait.map_or(wait, |m: u64| m.min(wait)));
                }
            }
        }
        min_wait.unwrap_or(0)
    }
}
