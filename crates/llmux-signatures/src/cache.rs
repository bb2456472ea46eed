//! In-memory, TTL + LRU signature cache with an optional persistent backend
//! (spec component C5).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default per-session LRU capacity.
pub const DEFAULT_MAX_ENTRIES_PER_SESSION: usize = 100;
/// Default in-memory TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Pluggable persistence for cache entries evicted from memory (or never
/// loaded into it yet). `llmux-signatures::sqlite` provides the default
/// `SQLite`-backed implementation.
pub trait CacheBackend: Send + Sync {
    /// Persist an entry.
    fn set(&self, session_id: &str, cache_key: &str, family: &str, signature: &str);
    /// Fetch a previously persisted entry's signature and family.
    fn get(&self, session_id: &str, cache_key: &str) -> Option<(String, String)>;
    /// Remove every entry for a session.
    fn clear_session(&self, session_id: &str);
}

#[derive(Clone)]
struct CacheEntry {
    signature: String,
    family: String,
    timestamp: Instant,
}

#[derive(Default)]
struct SessionBucket {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl SessionBucket {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn insert(&mut self, key: String, entry: CacheEntry, capacity: usize) {
        self.touch(&key);
        self.entries.insert(key, entry);
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// In-memory signature cache keyed by `(session_id, composite_key)`, with
/// per-session LRU eviction and TTL expiry, backed optionally by a
/// persistent [`CacheBackend`].
pub struct SignatureCache {
    sessions: DashMap<String, SessionBucket>,
    max_entries_per_session: usize,
    ttl: Duration,
    backend: Option<Box<dyn CacheBackend>>,
}

impl SignatureCache {
    /// Create a cache with default capacity/TTL and no persistent backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            max_entries_per_session: DEFAULT_MAX_ENTRIES_PER_SESSION,
            ttl: DEFAULT_TTL,
            backend: None,
        }
    }

    /// Attach a persistent backend used to survive restarts and memory
    /// eviction.
    #[must_use]
    pub fn with_backend(mut self, backend: Box<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Override the per-session LRU capacity.
    #[must_use]
    pub fn with_capacity(mut self, max_entries_per_session: usize) -> Self {
        self.max_entries_per_session = max_entries_per_session;
        self
    }

    /// Override the in-memory TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Store a signature under `(session_id, cache_key)`. Signatures shorter
    /// than 50 characters are considered malformed and ignored.
    pub fn store(&self, session_id: &str, cache_key: &str, signature: &str, family: &str) {
        if signature.len() < 50 {
            tracing::debug!(session_id, cache_key, "ignoring short signature");
            return;
        }

        let mut bucket = self.sessions.entry(session_id.to_string()).or_default();
        bucket.insert(
            cache_key.to_string(),
            CacheEntry {
                signature: signature.to_string(),
                family: family.to_string(),
                timestamp: Instant::now(),
            },
            self.max_entries_per_session,
        );
        drop(bucket);

        if let Some(backend) = &self.backend {
            backend.set(session_id, cache_key, family, signature);
        }
    }

    /// Restore a signature for `(session_id, cache_key)`. Checks memory
    /// first (and drops the entry if expired); falls through to the
    /// persistent backend on a miss, repopulating memory on a hit there.
    pub fn restore(&self, session_id: &str, cache_key: &str) -> Option<String> {
        if let Some(mut bucket) = self.sessions.get_mut(session_id) {
            if let Some(entry) = bucket.entries.get(cache_key).cloned() {
                if entry.timestamp.elapsed() <= self.ttl {
                    bucket.touch(cache_key);
                    return Some(entry.signature);
                }
                bucket.entries.remove(cache_key);
            }
        }

        let backend = self.backend.as_ref()?;
        let (signature, family) = backend.get(session_id, cache_key)?;
        self.store(session_id, cache_key, &signature, &family);
        Some(signature)
    }

    /// Drop every entry for `session_id`, in memory and in the backend.
    pub fn clear_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
        if let Some(backend) = &self.backend {
            backend.clear_session(session_id);
        }
    }

    /// Remove expired entries from every session's in-memory bucket and
    /// return the number removed. Does not touch the persistent backend.
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        for mut bucket in self.sessions.iter_mut() {
            let ttl = self.ttl;
            let stale: Vec<String> = bucket
                .entries
                .iter()
                .filter(|(_, e)| e.timestamp.elapsed() > ttl)
                .map(|(k, _)| k.clone())
                .collect();
            for key in stale {
                bucket.entries.remove(&key);
                if let Some(pos) = bucket.order.iter().position(|k| k == &key) {
                    bucket.order.remove(pos);
                }
                removed += 1;
            }
        }
        removed
    }

    /// Number of live entries for `session_id`.
    #[must_use]
    pub fn session_entry_count(&self, session_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .map_or(0, |b| b.entries.len())
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(n: u8) -> String {
        format!("sig-{:0>46}", n) // length 50
    }

    #[test]
    fn short_signature_is_ignored() {
        let cache = SignatureCache::new();
        cache.store("s1", "k1", "too-short", "claude");
        assert_eq!(cache.session_entry_count("s1"), 0);
    }

    #[test]
    fn store_then_restore_round_trips() {
        let cache = SignatureCache::new();
        let s = sig(1);
        cache.store("s1", "k1", &s, "claude");
        assert_eq!(cache.restore("s1", "k1"), Some(s));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let cache = SignatureCache::new().with_capacity(2);
        cache.store("s1", "k1", &sig(1), "claude");
        cache.store("s1", "k2", &sig(2), "claude");
        cache.store("s1", "k3", &sig(3), "claude");
        assert_eq!(cache.session_entry_count("s1"), 2);
        assert!(cache.restore("s1", "k1").is_none());
        assert!(cache.restore("s1", "k3").is_some());
    }

    #[test]
    fn ttl_expiry_drops_entry_on_read() {
        let cache = SignatureCache::new().with_ttl(Duration::from_millis(1));
        cache.store("s1", "k1", &sig(1), "claude");
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.restore("s1", "k1").is_none());
    }

    #[test]
    fn clear_session_removes_all_entries() {
        let cache = SignatureCache::new();
        cache.store("s1", "k1", &sig(1), "claude");
        cache.clear_session("s1");
        assert_eq!(cache.session_entry_count("s1"), 0);
    }

    #[test]
    fn sessions_are_independent() {
        let cache = SignatureCache::new().with_capacity(1);
        cache.store("s1", "k1", &sig(1), "claude");
        cache.store("s2", "k1", &sig(2), "claude");
        assert!(cache.restore("s1", "k1").is_some());
        assert!(cache.restore("s2", "k1").is_some());
    }

    #[test]
    fn touching_an_entry_protects_it_from_eviction() {
        let cache = SignatureCache::new().with_capacity(2);
        cache.store("s1", "a", &sig(1), "claude");
        cache.store("s1", "b", &sig(2), "claude");
        // touch "a" so "b" becomes the oldest
        cache.restore("s1", "a");
        cache.store("s1", "c", &sig(3), "claude");
        assert!(cache.restore("s1", "b").is_none());
        assert!(cache.restore("s1", "a").is_some());
    }
}
