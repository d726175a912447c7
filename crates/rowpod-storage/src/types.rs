//! Data types shared across backing-store implementations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// A single fetched row: an ordered list of values addressable by column name.
///
/// Values are carried as neutral [`serde_json::Value`]s so that callers do not
/// depend on any backend's native type system. Column order matches the
/// statement's projection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from parallel column and value lists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Internal` if the lists differ in length.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Result<Self, StoreError> {
        if columns.len() != values.len() {
            return Err(StoreError::internal(format!(
                "row arity mismatch: {} columns, {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Returns the value for `name`, if the row has such a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| &self.values[i])
    }

    /// Returns the value for `name`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingColumn` if the row has no such column.
    pub fn try_column(&self, name: &str) -> Result<&Value, StoreError> {
        self.column(name)
            .ok_or_else(|| StoreError::missing_column(name))
    }

    /// Returns the column names in projection order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in projection order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values in projection order.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the number of columns in this row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
