//! In-memory backing store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rowpod_storage::{BackingStore, Row, StoreError, StoreResult};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::statement::{self, ConflictAction, Statement};

/// One named table: column order, primary-key columns, and row data.
#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<String>,
    primary_key: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl MemTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// In-memory [`BackingStore`] implementation.
///
/// Tables live behind a `tokio::sync::RwLock` and statements are interpreted
/// by the small dialect in [`crate::statement`]. Beyond the trait surface the
/// store offers direct seeding and inspection plus one-shot failure
/// injection, which makes it the workhorse for cache-pod tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemTable>>,
    journal: Mutex<Vec<String>>,
    fail_next_execute: Mutex<Option<StoreError>>,
    fail_next_fetch: Mutex<Option<StoreError>>,
    fetch_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `table` directly, bypassing statement parsing.
    ///
    /// `primary_key` may name a column that is also listed in `columns`.
    pub async fn create_table(&self, table: &str, columns: &[&str], primary_key: Option<&str>) {
        let mut tables = self.tables.write().await;
        tables.insert(
            table.to_string(),
            MemTable {
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
                primary_key: primary_key.map(|c| vec![c.to_string()]).unwrap_or_default(),
                rows: Vec::new(),
            },
        );
    }

    /// Appends `rows` to `table` without statement parsing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Internal` if the table does not exist or a row's
    /// arity does not match the table's columns.
    pub async fn seed_rows(&self, table: &str, rows: Vec<Vec<Value>>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::internal(format!("no such table '{table}'")))?;
        for row in rows {
            if row.len() != t.columns.len() {
                return Err(StoreError::internal(format!(
                    "seed row arity mismatch for '{table}': {} values, {} columns",
                    row.len(),
                    t.columns.len()
                )));
            }
            t.rows.push(row);
        }
        Ok(())
    }

    /// Returns a copy of the raw rows of `table`, if it exists.
    pub async fn table_rows(&self, table: &str) -> Option<Vec<Vec<Value>>> {
        self.tables.read().await.get(table).map(|t| t.rows.clone())
    }

    /// Returns the number of rows in `table` (zero if absent).
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Returns every statement this store has been asked to run, in order.
    pub async fn executed_statements(&self) -> Vec<String> {
        self.journal.lock().await.clone()
    }

    /// Makes the next `execute` call fail with `err`.
    pub async fn fail_next_execute(&self, err: StoreError) {
        *self.fail_next_execute.lock().await = Some(err);
    }

    /// Makes the next `fetch` call fail with `err`.
    pub async fn fail_next_fetch(&self, err: StoreError) {
        *self.fail_next_fetch.lock().await = Some(err);
    }

    /// Delays every subsequent `fetch` by `delay` before answering.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().await = Some(delay);
    }

    /// Removes a previously configured fetch delay.
    pub async fn clear_fetch_delay(&self) {
        *self.fetch_delay.lock().await = None;
    }

    async fn apply_create(
        &self,
        statement: &str,
        table: String,
        columns: Vec<String>,
        primary_key: Vec<String>,
        if_not_exists: bool,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&table) {
            if if_not_exists {
                return Ok(0);
            }
            return Err(StoreError::statement(
                statement,
                format!("table '{table}' already exists"),
            ));
        }
        tables.insert(
            table,
            MemTable {
                columns,
                primary_key,
                rows: Vec::new(),
            },
        );
        Ok(0)
    }

    async fn apply_insert(
        &self,
        statement: &str,
        table: String,
        columns: Vec<String>,
        param_indexes: Vec<usize>,
        on_conflict: Option<ConflictAction>,
        params: &[Value],
    ) -> StoreResult<u64> {
        if columns.len() != param_indexes.len() {
            return Err(StoreError::statement(
                statement,
                "column/value arity mismatch",
            ));
        }

        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(&table)
            .ok_or_else(|| StoreError::statement(statement, format!("no such table '{table}'")))?;

        let mut updates = Vec::with_capacity(columns.len());
        for (column, idx) in columns.iter().zip(&param_indexes) {
            let target = t.column_index(column).ok_or_else(|| {
                StoreError::statement(statement, format!("no such column '{column}'"))
            })?;
            let value = params.get(*idx).ok_or_else(|| {
                StoreError::statement(statement, format!("missing parameter ${}", idx + 1))
            })?;
            updates.push((target, value.clone()));
        }

        let mut row = vec![Value::Null; t.columns.len()];
        for (target, value) in &updates {
            row[*target] = value.clone();
        }

        let key_indexes: Vec<usize> = t
            .primary_key
            .iter()
            .filter_map(|c| t.column_index(c))
            .collect();
        if !key_indexes.is_empty() {
            let existing = t
                .rows
                .iter()
                .position(|r| key_indexes.iter().all(|i| r[*i] == row[*i]));
            if let Some(pos) = existing {
                return match on_conflict {
                    None => Err(StoreError::statement(
                        statement,
                        "duplicate key value violates primary key constraint",
                    )),
                    Some(ConflictAction::Nothing) => Ok(0),
                    Some(ConflictAction::Update) => {
                        for (target, value) in updates {
                            t.rows[pos][target] = value;
                        }
                        Ok(1)
                    }
                };
            }
        }

        t.rows.push(row);
        Ok(1)
    }

    async fn apply_update(
        &self,
        statement: &str,
        table: String,
        assignments: Vec<(String, usize)>,
        condition: (String, usize),
        params: &[Value],
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(&table)
            .ok_or_else(|| StoreError::statement(statement, format!("no such table '{table}'")))?;

        let (cond_column, cond_idx) = condition;
        let cond_target = t.column_index(&cond_column).ok_or_else(|| {
            StoreError::statement(statement, format!("no such column '{cond_column}'"))
        })?;
        let cond_value = params.get(cond_idx).ok_or_else(|| {
            StoreError::statement(statement, format!("missing parameter ${}", cond_idx + 1))
        })?;

        let mut updates = Vec::with_capacity(assignments.len());
        for (column, idx) in &assignments {
            let target = t.column_index(column).ok_or_else(|| {
                StoreError::statement(statement, format!("no such column '{column}'"))
            })?;
            let value = params.get(*idx).ok_or_else(|| {
                StoreError::statement(statement, format!("missing parameter ${}", idx + 1))
            })?;
            updates.push((target, value.clone()));
        }

        let mut affected = 0u64;
        for row in &mut t.rows {
            if row[cond_target] == *cond_value {
                for (target, value) in &updates {
                    row[*target] = value.clone();
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn apply_delete(
        &self,
        statement: &str,
        table: String,
        condition: (String, usize),
        params: &[Value],
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let t = tables
            .get_mut(&table)
            .ok_or_else(|| StoreError::statement(statement, format!("no such table '{table}'")))?;

        let (cond_column, cond_idx) = condition;
        let cond_target = t.column_index(&cond_column).ok_or_else(|| {
            StoreError::statement(statement, format!("no such column '{cond_column}'"))
        })?;
        let cond_value = params.get(cond_idx).ok_or_else(|| {
            StoreError::statement(statement, format!("missing parameter ${}", cond_idx + 1))
        })?;

        let before = t.rows.len();
        t.rows.retain(|r| r[cond_target] != *cond_value);
        Ok((before - t.rows.len()) as u64)
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn execute(&self, statement: &str, params: &[Value]) -> StoreResult<u64> {
        self.journal.lock().await.push(statement.to_string());
        if let Some(err) = self.fail_next_execute.lock().await.take() {
            return Err(err);
        }

        match statement::parse(statement)? {
            Statement::Create {
                table,
                columns,
                primary_key,
                if_not_exists,
            } => {
                self.apply_create(statement, table, columns, primary_key, if_not_exists)
                    .await
            }
            Statement::Insert {
                table,
                columns,
                params: param_indexes,
                on_conflict,
            } => {
                self.apply_insert(statement, table, columns, param_indexes, on_conflict, params)
                    .await
            }
            Statement::Update {
                table,
                assignments,
                condition,
            } => {
                self.apply_update(statement, table, assignments, condition, params)
                    .await
            }
            Statement::Delete { table, condition } => {
                self.apply_delete(statement, table, condition, params).await
            }
            Statement::Select { .. } => Err(StoreError::statement(
                statement,
                "SELECT statements must be issued through fetch",
            )),
        }
    }

    async fn fetch(&self, statement: &str, _params: &[Value]) -> StoreResult<Vec<Row>> {
        self.journal.lock().await.push(statement.to_string());
        let delay = *self.fetch_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_next_fetch.lock().await.take() {
            return Err(err);
        }

        let Statement::Select { table, columns } = statement::parse(statement)? else {
            return Err(StoreError::statement(
                statement,
                "only SELECT statements can be fetched",
            ));
        };

        let tables = self.tables.read().await;
        let t = tables
            .get(&table)
            .ok_or_else(|| StoreError::statement(statement, format!("no such table '{table}'")))?;

        let projection: Vec<(String, usize)> = if columns.len() == 1 && columns[0] == "*" {
            t.columns.iter().cloned().zip(0..).collect()
        } else {
            columns
                .into_iter()
                .map(|c| {
                    let idx = t.column_index(&c).ok_or_else(|| {
                        StoreError::statement(statement, format!("no such column '{c}'"))
                    })?;
                    Ok((c, idx))
                })
                .collect::<StoreResult<_>>()?
        };

        let mut rows = Vec::with_capacity(t.rows.len());
        for raw in &t.rows {
            let names = projection.iter().map(|(c, _)| c.clone()).collect();
            let values = projection.iter().map(|(_, i)| raw[*i].clone()).collect();
            rows.push(Row::new(names, values)?);
        }
        Ok(rows)
    }

    async fn primary_key_columns(&self, table: &str) -> StoreResult<Vec<String>> {
        // An absent table answers like a keyless one, matching how an
        // INFORMATION_SCHEMA lookup comes back empty.
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .map(|t| t.primary_key.clone())
            .unwrap_or_default())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
