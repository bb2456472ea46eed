//! # llmux-signatures
//!
//! The two signature-lifecycle persistence layers (spec components C5 and
//! C6):
//!
//! - [`cache`]: the in-memory, TTL + LRU [`cache::SignatureCache`], with an
//!   optional persistent [`cache::CacheBackend`].
//! - [`store`]: the persistent, project-scoped [`store::SignatureStore`] and
//!   the `validate_and_strip_signatures` admissibility check.
//! - [`sqlite`]: the default `SQLite` + `r2d2` persistence backing both of
//!   the above.

#![deny(unsafe_code)]

pub mod cache;
pub mod errors;
pub mod sqlite;
pub mod store;

pub use cache::SignatureCache;
pub use errors::{Result, SignatureStoreError};
pub use store::{NewSignatureRecord, SignatureStore, StripOutcome, validate_and_strip_signatures};
