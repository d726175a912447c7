//! PostgreSQL implementation of the backing store.

use std::fmt;

use async_trait::async_trait;
use rowpod_storage::{BackingStore, Row, StoreResult};
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::{Result, statement_failure};
use crate::pool::create_pool;
use crate::value::{bind_value, decode_row};

/// Resolves the primary-key columns of a table, in key order.
const PRIMARY_KEY_SQL: &str = "\
    SELECT kcu.column_name \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.key_column_usage kcu \
      ON tc.constraint_name = kcu.constraint_name \
     AND tc.table_schema = kcu.table_schema \
     AND tc.table_name = kcu.table_name \
    WHERE tc.constraint_type = 'PRIMARY KEY' \
      AND tc.table_name = $1 \
    ORDER BY kcu.ordinal_position";

/// PostgreSQL-backed [`BackingStore`].
///
/// Statements are executed against a shared connection pool; parameters
/// arrive as JSON values and rows are decoded back to JSON by column type.
/// The store holds no state beyond the pool, so cloning the pool and
/// constructing several stores over it is fine.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool from `config` and wraps it in a store.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool cannot be created or the server
    /// refuses the connection.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        Ok(Self::new(create_pool(config).await?))
    }

    /// Round-trips a trivial statement to prove the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error when no connection can be established.
    #[instrument(skip_all)]
    pub async fn ping(&self) -> Result<()> {
        query("SELECT 1").execute(&self.pool).await?;
        debug!("Backing store answered ping");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BackingStore for PostgresStore {
    #[instrument(skip_all)]
    async fn execute(&self, statement: &str, params: &[Value]) -> StoreResult<u64> {
        let mut query = query(statement);
        for param in params {
            query = bind_value(query, param)?;
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| statement_failure(statement, e))?;

        debug!(
            statement,
            rows_affected = result.rows_affected(),
            "Executed statement"
        );
        Ok(result.rows_affected())
    }

    #[instrument(skip_all)]
    async fn fetch(&self, statement: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        let mut query = query(statement);
        for param in params {
            query = bind_value(query, param)?;
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| statement_failure(statement, e))?;

        debug!(statement, rows = rows.len(), "Fetched rows");
        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip_all, fields(table = %table))]
    async fn primary_key_columns(&self, table: &str) -> StoreResult<Vec<String>> {
        let names: Vec<(String,)> = query_as(PRIMARY_KEY_SQL)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| statement_failure(PRIMARY_KEY_SQL, e))?;

        Ok(names.into_iter().map(|(name,)| name).collect())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

impl fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStore")
            .field("connections", &self.pool.size())
            .finish_non_exhaustive()
    }
}
