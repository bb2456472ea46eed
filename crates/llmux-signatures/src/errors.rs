//! Error type for the signature persistence layer.

use thiserror::Error;

/// Errors raised by [`crate::sqlite`].
#[derive(Debug, Error)]
pub enum SignatureStoreError {
    /// A pool checkout failed.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A `SQLite` query or statement failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A migration failed to apply.
    #[error("migration failed: {message}")]
    Migration {
        /// Description of what went wrong.
        message: String,
    },

    /// A stored entry failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias for this crate's `Result`.
pub type Result<T> = std::result::Result<T, SignatureStoreError>;
