//! Core trait that all backing-store backends must implement.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::types::Row;

/// The contract between a cache pod and the relational store it mirrors.
///
/// Statements are opaque, caller-trusted text in the backend's own dialect
/// with positional parameters (`$1`, `$2`, ...). No sanitization or rewriting
/// happens at this boundary. Implementations must be thread-safe
/// (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use rowpod_storage::{BackingStore, StoreError};
///
/// async fn prefix_rows(store: &dyn BackingStore) -> Result<usize, StoreError> {
///     let rows = store
///         .fetch("SELECT guild_id, prefix FROM guild_prefixes", &[])
///         .await?;
///     Ok(rows.len())
/// }
/// ```
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Executes a statement that returns no rows.
    ///
    /// Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Statement` if the store rejects the statement and
    /// `StoreError::Connection` for infrastructure failures.
    async fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, StoreError>;

    /// Executes a statement and returns the resulting rows in order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Statement` if the store rejects the statement,
    /// `StoreError::Decode` if a value cannot be represented as a neutral
    /// JSON value, and `StoreError::Connection` for infrastructure failures.
    async fn fetch(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;

    /// Returns the primary-key column names of `table`, in ordinal order.
    ///
    /// Returns an empty list if the table exists but carries no primary key.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure or metadata-query failures,
    /// not for absent keys.
    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>, StoreError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
