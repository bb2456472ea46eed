//! Persistent backend for the in-memory [`crate::cache::SignatureCache`].

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;

/// One persisted signature-cache entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    /// The signature string.
    pub signature: String,
    /// Model family the signature was captured under.
    pub family: String,
    /// When the entry was written (RFC3339).
    pub created_at: String,
}

/// Stateless repository for the `signature_cache` table.
pub struct SignatureCacheRepo;

impl SignatureCacheRepo {
    /// Insert or overwrite an entry for `(session_id, cache_key)`.
    pub fn set(
        conn: &Connection,
        session_id: &str,
        cache_key: &str,
        family: &str,
        signature: &str,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO signature_cache (session_id, cache_key, family, signature, created_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT (session_id, cache_key) DO UPDATE SET
                 family = excluded.family,
                 signature = excluded.signature,
                 created_at = excluded.created_at",
            params![session_id, cache_key, family, signature],
        )?;
        Ok(())
    }

    /// Fetch a single entry, if present.
    pub fn get(conn: &Connection, session_id: &str, cache_key: &str) -> Result<Option<CacheEntry>> {
        conn.query_row(
            "SELECT signature, family, created_at FROM signature_cache
             WHERE session_id = ?1 AND cache_key = ?2",
            params![session_id, cache_key],
            |row| {
                Ok(CacheEntry {
                    signature: row.get(0)?,
                    family: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Delete one entry.
    pub fn delete(conn: &Connection, session_id: &str, cache_key: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM signature_cache WHERE session_id = ?1 AND cache_key = ?2",
            params![session_id, cache_key],
        )?;
        Ok(())
    }

    /// Delete every entry for `session_id`.
    pub fn clear_session(conn: &Connection, session_id: &str) -> Result<usize> {
        let n = conn.execute(
            "DELETE FROM signature_cache WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(n)
    }

    /// Count entries currently stored for `session_id`.
    pub fn session_entry_count(conn: &Connection, session_id: &str) -> Result<u64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM signature_cache WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Delete entries older than `ttl_seconds`. Returns the number removed.
    pub fn cleanup_expired(conn: &Connection, ttl_seconds: i64) -> Result<usize> {
        let n = conn.execute(
            "DELETE FROM signature_cache
             WHERE created_at < datetime('now', ?1)",
            params![format!("-{ttl_seconds} seconds")],
        )?;
        Ok(n)
    }
}
