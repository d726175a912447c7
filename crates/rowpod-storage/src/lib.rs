//! # rowpod-storage
//!
//! Backing-store abstraction layer for rowpod cache pods.
//!
//! This crate defines the traits and types that all backing-store backends
//! must implement. It does not contain any implementations - those are
//! provided by separate crates.
//!
//! ## Overview
//!
//! The main trait is [`BackingStore`], which defines the contract for:
//! - Executing write statements (`execute`)
//! - Fetching row sequences (`fetch`)
//! - Reading primary-key metadata (`primary_key_columns`)
//!
//! Statements are opaque and trusted; values cross the boundary as neutral
//! [`serde_json::Value`]s so that consumers stay independent of any backend's
//! native type system.
//!
//! ## Example
//!
//! ```ignore
//! use rowpod_storage::{BackingStore, StoreError};
//! use serde_json::json;
//!
//! async fn set_prefix(store: &dyn BackingStore, guild: i64, prefix: &str) -> Result<(), StoreError> {
//!     store
//!         .execute(
//!             "UPDATE guild_prefixes SET prefix = $2 WHERE guild_id = $1",
//!             &[json!(guild), json!(prefix)],
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! To implement a backend, implement the [`BackingStore`] trait:
//!
//! ```ignore
//! use async_trait::async_trait;
//! use rowpod_storage::{BackingStore, Row, StoreError};
//! use serde_json::Value;
//!
//! struct MyStore {
//!     // ...
//! }
//!
//! #[async_trait]
//! impl BackingStore for MyStore {
//!     async fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, StoreError> {
//!         // Implementation
//!     }
//!     // ... other methods
//! }
//! ```

mod error;
mod traits;
mod types;

// Re-export everything from submodules
pub use error::{ErrorCategory, StoreError};
pub use traits::BackingStore;
pub use types::Row;

/// Type alias for a backing-store result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shared backing-store trait object.
pub type DynStore = std::sync::Arc<dyn BackingStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use rowpod_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StoreError};
    pub use crate::traits::BackingStore;
    pub use crate::types::Row;
    pub use crate::{DynStore, StoreResult};
}
