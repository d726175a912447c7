//! Error types for cache pods.
//!
//! Every failure surfaces as a [`CacheError`]; pods never retry internally
//! and never degrade an error into a default value.

use rowpod_storage::StoreError;

use crate::events::ListenerError;

/// Errors that can occur while operating a cache pod.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A read was attempted before the first successful pull.
    #[error("Cache pod is not ready: no pull has completed")]
    NotReady,

    /// A second backing store was offered to an already-bound pod.
    #[error("A backing store is already bound to this pod")]
    AlreadyBound,

    /// An operation needing a backing store ran on an unbound pod.
    #[error("No backing store is bound to this pod")]
    NotBound,

    /// The configured key column is not the mirrored table's primary key.
    #[error("Column '{column}' is not a primary key of table '{table}'")]
    KeyIntegrity {
        /// The mirrored table.
        table: String,
        /// The configured key column.
        column: String,
    },

    /// A lookup required an entry that is not cached.
    #[error("No cached entry for key {key}")]
    KeyNotFound {
        /// Debug rendering of the missing key.
        key: String,
    },

    /// A write or create operation ran without its statement template.
    #[error("No {operation} statement is configured for this pod")]
    MissingStatement {
        /// The operation that needed the template.
        operation: String,
    },

    /// A key or value could not be converted to or from its wire form.
    #[error("Key/value codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The backing store reported a failure.
    #[error("Backing store failure: {0}")]
    Store(#[from] StoreError),

    /// An event listener reported a failure.
    #[error("Listener failure: {0}")]
    Listener(#[from] ListenerError),
}

/// Type alias for a cache-pod result.
pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    /// Creates a new `NotReady` error.
    #[must_use]
    pub fn not_ready() -> Self {
        Self::NotReady
    }

    /// Creates a new `AlreadyBound` error.
    #[must_use]
    pub fn already_bound() -> Self {
        Self::AlreadyBound
    }

    /// Creates a new `NotBound` error.
    #[must_use]
    pub fn not_bound() -> Self {
        Self::NotBound
    }

    /// Creates a new `KeyIntegrity` error.
    #[must_use]
    pub fn key_integrity(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::KeyIntegrity {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates a new `MissingStatement` error.
    #[must_use]
    pub fn missing_statement(operation: impl Into<String>) -> Self {
        Self::MissingStatement {
            operation: operation.into(),
        }
    }

    /// Returns `true` if this is a not-ready error.
    #[must_use]
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady)
    }

    /// Returns `true` if this is an already-bound error.
    #[must_use]
    pub fn is_already_bound(&self) -> bool {
        matches!(self, Self::AlreadyBound)
    }

    /// Returns `true` if this is a not-bound error.
    #[must_use]
    pub fn is_not_bound(&self) -> bool {
        matches!(self, Self::NotBound)
    }

    /// Returns `true` if this is a key-integrity error.
    #[must_use]
    pub fn is_key_integrity(&self) -> bool {
        matches!(self, Self::KeyIntegrity { .. })
    }

    /// Returns `true` if this is a key-not-found error.
    #[must_use]
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// Returns `true` if this error originated in the backing store.
    #[must_use]
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
