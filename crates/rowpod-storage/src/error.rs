//! Error types for the backing-store abstraction layer.
//!
//! This module defines all error types that can occur while talking to a
//! backing store.

use std::fmt;

/// Errors that can occur during backing-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to reach the backing store.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// A statement was rejected or failed during execution.
    #[error("Statement failed: {message}")]
    Statement {
        /// The statement that failed.
        statement: String,
        /// Description of the failure.
        message: String,
    },

    /// A fetched value could not be decoded into a neutral JSON value.
    #[error("Failed to decode column '{column}': {message}")]
    Decode {
        /// The column whose value could not be decoded.
        column: String,
        /// Description of the decode failure.
        message: String,
    },

    /// The backend does not understand the given statement.
    #[error("Unsupported statement: {statement}")]
    UnsupportedStatement {
        /// The statement that was not recognized.
        statement: String,
    },

    /// A row was missing a column the caller asked for.
    #[error("Row has no column named '{column}'")]
    MissingColumn {
        /// The requested column name.
        column: String,
    },

    /// An internal backend error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Statement` error.
    #[must_use]
    pub fn statement(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Statement {
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedStatement` error.
    #[must_use]
    pub fn unsupported(statement: impl Into<String>) -> Self {
        Self::UnsupportedStatement {
            statement: statement.into(),
        }
    }

    /// Creates a new `MissingColumn` error.
    #[must_use]
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if this is an unsupported-statement error.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedStatement { .. })
    }

    /// Returns `true` if this is a missing-column error.
    #[must_use]
    pub fn is_missing_column(&self) -> bool {
        matches!(self, Self::MissingColumn { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Statement { .. } => ErrorCategory::Statement,
            Self::Decode { .. } | Self::MissingColumn { .. } => ErrorCategory::Decode,
            Self::UnsupportedStatement { .. } => ErrorCategory::Unsupported,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of store errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Infrastructure/connection error.
    Infrastructure,
    /// Statement execution error.
    Statement,
    /// Value or row shape decode error.
    Decode,
    /// Statement not understood by the backend.
    Unsupported,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Statement => write!(f, "statement"),
            Self::Decode => write!(f, "decode"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
