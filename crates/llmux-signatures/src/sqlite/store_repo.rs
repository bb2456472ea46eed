//! Persistent project-scoped signature registry (C6).

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;

/// One persisted signature record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureRecord {
    /// The signature string, the primary key.
    pub signature: String,
    /// Which project this signature is admissible for.
    pub project_id: String,
    /// The upstream provider that emitted it.
    pub provider: String,
    /// The endpoint it was issued against, if tracked.
    pub endpoint: Option<String>,
    /// The account index/identifier it was issued under, if tracked.
    pub account: Option<String>,
    /// When the record was written (RFC3339).
    pub created_at: String,
}

/// Stateless repository for the `signature_store` table.
pub struct SignatureStoreRepo;

impl SignatureStoreRepo {
    /// Insert a signature record. Overwrites an existing record with the
    /// same signature, matching "last write wins" semantics of the source
    /// persisted-at-capture design.
    pub fn save(
        conn: &Connection,
        signature: &str,
        project_id: &str,
        provider: &str,
        endpoint: Option<&str>,
        account: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO signature_store
                 (signature, project_id, provider, endpoint, account, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
             ON CONFLICT (signature) DO UPDATE SET
                 project_id = excluded.project_id,
                 provider = excluded.provider,
                 endpoint = excluded.endpoint,
                 account = excluded.account,
                 created_at = excluded.created_at",
            params![signature, project_id, provider, endpoint, account],
        )?;
        Ok(())
    }

    /// Fetch a record by signature string.
    pub fn get(conn: &Connection, signature: &str) -> Result<Option<SignatureRecord>> {
        conn.query_row(
            "SELECT signature, project_id, provider, endpoint, account, created_at
             FROM signature_store WHERE signature = ?1",
            params![signature],
            |row| {
                Ok(SignatureRecord {
                    signature: row.get(0)?,
                    project_id: row.get(1)?,
                    provider: row.get(2)?,
                    endpoint: row.get(3)?,
                    account: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// True iff `signature` is recorded as belonging to `project_id`.
    pub fn is_valid_for_project(
        conn: &Connection,
        signature: &str,
        project_id: &str,
    ) -> Result<bool> {
        Ok(Self::get(conn, signature)?.is_some_and(|r| r.project_id == project_id))
    }
}
