//! Pod configuration: the mirrored projection and its statement templates.

use serde::{Deserialize, Serialize};

/// Statement templates a pod runs against its backing store.
///
/// Templates are opaque, caller-trusted text in the backend's dialect.
/// Positional parameter conventions: `insert` and `update` receive
/// `$1 = key, $2 = value`; `delete` receives `$1 = key`; `create` receives
/// no parameters. Any template may be left unset, in which case the
/// corresponding pod operation fails with a missing-statement error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementSet {
    /// Creates the mirrored table, typically `CREATE TABLE IF NOT EXISTS ...`.
    pub create: Option<String>,
    /// Inserts a new key/value pair.
    pub insert: Option<String>,
    /// Rewrites the value of an existing key.
    pub update: Option<String>,
    /// Removes a key.
    pub delete: Option<String>,
}

impl StatementSet {
    /// Creates an empty set with every template unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the create template.
    #[must_use]
    pub fn with_create(mut self, statement: impl Into<String>) -> Self {
        self.create = Some(statement.into());
        self
    }

    /// Sets the insert template.
    #[must_use]
    pub fn with_insert(mut self, statement: impl Into<String>) -> Self {
        self.insert = Some(statement.into());
        self
    }

    /// Sets the update template.
    #[must_use]
    pub fn with_update(mut self, statement: impl Into<String>) -> Self {
        self.update = Some(statement.into());
        self
    }

    /// Sets the delete template.
    #[must_use]
    pub fn with_delete(mut self, statement: impl Into<String>) -> Self {
        self.delete = Some(statement.into());
        self
    }
}

/// Configuration of one cache pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodConfig {
    /// The table the pod mirrors.
    pub table: String,
    /// Column whose values become cache keys.
    pub key_column: String,
    /// Column whose values become cache values.
    pub value_column: String,
    /// Statement templates for writes and table creation.
    #[serde(default)]
    pub statements: StatementSet,
    /// Verify during pull that `key_column` is one of the table's
    /// primary-key columns. On by default.
    #[serde(default = "default_verify_primary_key")]
    pub verify_primary_key: bool,
}

fn default_verify_primary_key() -> bool {
    true
}

impl PodConfig {
    /// Creates a config mirroring `table` with the given key and value columns.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key_column: key_column.into(),
            value_column: value_column.into(),
            statements: StatementSet::default(),
            verify_primary_key: true,
        }
    }

    /// Sets the statement templates.
    #[must_use]
    pub fn with_statements(mut self, statements: StatementSet) -> Self {
        self.statements = statements;
        self
    }

    /// Enables or disables primary-key verification during pull.
    #[must_use]
    pub fn with_verify_primary_key(mut self, verify: bool) -> Self {
        self.verify_primary_key = verify;
        self
    }

    /// The projection statement a pull runs.
    #[must_use]
    pub fn pull_statement(&self) -> String {
        format!(
            "SELECT {}, {} FROM {}",
            self.key_column, self.value_column, self.table
        )
    }
}
