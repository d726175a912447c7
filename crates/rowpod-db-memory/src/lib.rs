//! In-memory backing store for rowpod cache pods.
//!
//! This crate provides an in-memory implementation of the `BackingStore`
//! trait from `rowpod-storage`. It interprets a small statement dialect
//! (CREATE TABLE, INSERT with an optional ON CONFLICT tail, single-condition
//! UPDATE/DELETE, projection-only SELECT) and adds seeding, inspection, and
//! failure-injection hooks, making it the natural backend for tests and for
//! embedding without a database.
//!
//! # Example
//!
//! ```ignore
//! use rowpod_db_memory::MemoryStore;
//! use rowpod_storage::BackingStore;
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! store.create_table("guild_prefixes", &["guild_id", "prefix"], Some("guild_id")).await;
//! store.seed_rows("guild_prefixes", vec![vec![json!(1), json!("!")]]).await?;
//!
//! let rows = store.fetch("SELECT guild_id, prefix FROM guild_prefixes", &[]).await?;
//! ```

mod statement;
pub mod store;

pub use store::MemoryStore;

// Re-export the trait and its companions for convenience
pub use rowpod_storage::{BackingStore, DynStore, Row, StoreError};

/// Creates a new shareable in-memory store.
#[must_use]
pub fn create_store() -> DynStore {
    std::sync::Arc::new(MemoryStore::new())
}
