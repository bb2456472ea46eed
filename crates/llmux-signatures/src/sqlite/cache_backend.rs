//! [`crate::cache::CacheBackend`] implementation backed by `SQLite`.

use crate::cache::CacheBackend;
use crate::sqlite::{ConnectionPool, SignatureCacheRepo};

/// `SQLite`-backed persistence for [`crate::cache::SignatureCache`].
pub struct SqliteCacheBackend {
    pool: ConnectionPool,
}

impl SqliteCacheBackend {
    /// Wrap an already-migrated connection pool.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

impl CacheBackend for SqliteCacheBackend {
    fn set(&self, session_id: &str, cache_key: &str, family: &str, signature: &str) {
        let Ok(conn) = self.pool.get() else {
            tracing::warn!(session_id, "failed to check out connection for cache set");
            return;
        };
        if let Err(err) = SignatureCacheRepo::set(&conn, session_id, cache_key, family, signature)
        {
            tracing::warn!(session_id, %err, "failed to persist signature cache entry");
        }
    }

    fn get(&self, session_id: &str, cache_key: &str) -> Option<(String, String)> {
        let conn = self.pool.get().ok()?;
        SignatureCacheRepo::get(&conn, session_id, cache_key)
            .ok()
            .flatten()
            .map(|e| (e.signature, e.family))
    }

    fn clear_session(&self, session_id: &str) {
        if let Ok(conn) = self.pool.get() {
            let _ = SignatureCacheRepo::clear_session(&conn, session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SignatureCache;
    use crate::sqlite::{ConnectionConfig, new_in_memory, run_migrations};

    #[test]
    fn persists_across_cache_instances() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }

        let sig = "x".repeat(60);
        {
            let cache = SignatureCache::new()
                .with_backend(Box::new(SqliteCacheBackend::new(pool.clone())));
            cache.store("s1", "k1", &sig, "claude");
        }

        let cache2 =
            SignatureCache::new().with_backend(Box::new(SqliteCacheBackend::new(pool)));
        assert_eq!(cache2.restore("s1", "k1"), Some(sig));
    }
}
