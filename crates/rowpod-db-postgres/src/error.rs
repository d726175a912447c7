//! Error types for the PostgreSQL backing store.

use rowpod_storage::StoreError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for undefined table (42P01).
pub const PG_UNDEFINED_TABLE: &str = "42P01";

/// PostgreSQL error code for unique constraint violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Checks if a sqlx error is "undefined table" (42P01).
pub fn is_undefined_table(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNDEFINED_TABLE)
}

/// Errors specific to the PostgreSQL backing store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Pool error.
    #[error("Pool error: {message}")]
    Pool { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new pool error.
    #[must_use]
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StoreError::connection(e.to_string()),
            PostgresError::Config { message } => {
                StoreError::internal(format!("Configuration error: {message}"))
            }
            PostgresError::Pool { message } => {
                StoreError::connection(format!("Pool error: {message}"))
            }
        }
    }
}

/// Maps a sqlx failure for `statement` onto the storage error taxonomy.
///
/// Errors the server reported against the statement itself become
/// `StoreError::Statement`; everything else (I/O, pool, TLS) is a
/// connection-level failure.
pub fn statement_failure(statement: &str, err: SqlxError) -> StoreError {
    match err {
        SqlxError::Database(db_err) => StoreError::statement(statement, db_err.to_string()),
        other => StoreError::connection(other.to_string()),
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
