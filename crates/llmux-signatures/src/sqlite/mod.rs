//! `SQLite`-backed persistence for the signature cache and signature store.

pub mod cache_backend;
pub mod cache_repo;
pub mod connection;
pub mod migrations;
pub mod store_repo;

pub use cache_backend::SqliteCacheBackend;
pub use cache_repo::{CacheEntry, SignatureCacheRepo};
pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use migrations::run_migrations;
pub use store_repo::{SignatureRecord, SignatureStoreRepo};
