//! Minimal statement interpretation for the in-memory backend.
//!
//! The backend understands just enough statement shapes to serve a cache
//! pod's templates: `CREATE TABLE`, `INSERT` (with an optional `ON CONFLICT`
//! tail), single-condition `UPDATE` and `DELETE`, and projection-only
//! `SELECT`. Anything else is reported as unsupported.

use std::sync::LazyLock;

use regex::Regex;
use rowpod_storage::StoreError;

static SELECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*SELECT\s+(?P<cols>\*|[\w\s,]+?)\s+FROM\s+(?P<table>\w+)\s*;?\s*$")
        .expect("Invalid select regex")
});

static INSERT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*INSERT\s+INTO\s+(?P<table>\w+)\s*\((?P<cols>[^)]+)\)\s*VALUES\s*\((?P<params>[^)]+)\)\s*(?P<tail>ON\s+CONFLICT\b.*?)?;?\s*$",
    )
    .expect("Invalid insert regex")
});

static UPDATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*UPDATE\s+(?P<table>\w+)\s+SET\s+(?P<set>.+?)\s+WHERE\s+(?P<cond>.+?)\s*;?\s*$")
        .expect("Invalid update regex")
});

static DELETE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*DELETE\s+FROM\s+(?P<table>\w+)\s+WHERE\s+(?P<cond>.+?)\s*;?\s*$")
        .expect("Invalid delete regex")
});

static CREATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*CREATE\s+TABLE\s+(?P<ine>IF\s+NOT\s+EXISTS\s+)?(?P<table>\w+)\s*\((?P<body>.+)\)\s*;?\s*$",
    )
    .expect("Invalid create regex")
});

static ASSIGN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<col>\w+)\s*=\s*\$(?P<idx>\d+)\s*$").expect("Invalid assignment regex")
});

static PK_CONSTRAINT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^PRIMARY\s+KEY\s*\((?P<cols>[\w\s,]+)\)$").expect("Invalid constraint regex")
});

static CONFLICT_ACTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ON\s+CONFLICT\s*(?:\([^)]*\))?\s*DO\s+(?P<action>NOTHING|UPDATE)")
        .expect("Invalid conflict regex")
});

/// What an `ON CONFLICT` tail asks for when an inserted key collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConflictAction {
    /// Leave the existing row untouched.
    Nothing,
    /// Overwrite the inserted columns on the existing row.
    Update,
}

/// A statement the in-memory backend knows how to run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    Create {
        table: String,
        columns: Vec<String>,
        primary_key: Vec<String>,
        if_not_exists: bool,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        /// Zero-based parameter index per inserted column.
        params: Vec<usize>,
        on_conflict: Option<ConflictAction>,
    },
    Update {
        table: String,
        /// `(column, zero-based parameter index)` per `SET` assignment.
        assignments: Vec<(String, usize)>,
        condition: (String, usize),
    },
    Delete {
        table: String,
        condition: (String, usize),
    },
    Select {
        table: String,
        /// Projected column names, or a single `"*"` entry.
        columns: Vec<String>,
    },
}

/// Parses `statement` into one of the supported shapes.
pub(crate) fn parse(statement: &str) -> Result<Statement, StoreError> {
    if let Some(caps) = SELECT_REGEX.captures(statement) {
        return Ok(Statement::Select {
            table: caps["table"].to_string(),
            columns: split_names(&caps["cols"]),
        });
    }

    if let Some(caps) = INSERT_REGEX.captures(statement) {
        let columns = split_names(&caps["cols"]);
        let params = split_names(&caps["params"])
            .iter()
            .map(|p| param_index(statement, p))
            .collect::<Result<Vec<_>, _>>()?;
        let on_conflict = match caps.name("tail") {
            None => None,
            Some(tail) => Some(conflict_action(statement, tail.as_str())?),
        };
        return Ok(Statement::Insert {
            table: caps["table"].to_string(),
            columns,
            params,
            on_conflict,
        });
    }

    if let Some(caps) = UPDATE_REGEX.captures(statement) {
        let assignments = split_names(&caps["set"])
            .iter()
            .map(|a| assignment(statement, a))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Statement::Update {
            table: caps["table"].to_string(),
            assignments,
            condition: assignment(statement, &caps["cond"])?,
        });
    }

    if let Some(caps) = DELETE_REGEX.captures(statement) {
        return Ok(Statement::Delete {
            table: caps["table"].to_string(),
            condition: assignment(statement, &caps["cond"])?,
        });
    }

    if let Some(caps) = CREATE_REGEX.captures(statement) {
        let (columns, primary_key) = parse_column_defs(&caps["body"]);
        return Ok(Statement::Create {
            table: caps["table"].to_string(),
            columns,
            primary_key,
            if_not_exists: caps.name("ine").is_some(),
        });
    }

    Err(StoreError::unsupported(statement))
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn param_index(statement: &str, token: &str) -> Result<usize, StoreError> {
    token
        .strip_prefix('$')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .map(|n| n - 1)
        .ok_or_else(|| StoreError::unsupported(statement))
}

fn assignment(statement: &str, clause: &str) -> Result<(String, usize), StoreError> {
    let caps = ASSIGN_REGEX
        .captures(clause)
        .ok_or_else(|| StoreError::unsupported(statement))?;
    let idx: usize = caps["idx"]
        .parse()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| StoreError::unsupported(statement))?;
    Ok((caps["col"].to_string(), idx - 1))
}

fn conflict_action(statement: &str, tail: &str) -> Result<ConflictAction, StoreError> {
    let caps = CONFLICT_ACTION_REGEX
        .captures(tail)
        .ok_or_else(|| StoreError::unsupported(statement))?;
    if caps["action"].eq_ignore_ascii_case("nothing") {
        Ok(ConflictAction::Nothing)
    } else {
        Ok(ConflictAction::Update)
    }
}

/// Splits a `CREATE TABLE` body into column names and primary-key columns.
///
/// Recognizes both the inline form (`guild_id BIGINT PRIMARY KEY`) and the
/// table-constraint form (`PRIMARY KEY (guild_id)`). Type names are ignored.
fn parse_column_defs(body: &str) -> (Vec<String>, Vec<String>) {
    let mut columns = Vec::new();
    let mut primary_key = Vec::new();

    for def in split_top_level(body) {
        let def = def.trim();
        if def.is_empty() {
            continue;
        }
        if let Some(caps) = PK_CONSTRAINT_REGEX.captures(def) {
            primary_key.extend(split_names(&caps["cols"]));
            continue;
        }
        let Some(name) = def.split_whitespace().next() else {
            continue;
        };
        columns.push(name.to_string());
        if def.to_ascii_uppercase().contains("PRIMARY KEY") {
            primary_key.push(name.to_string());
        }
    }

    (columns, primary_key)
}

fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}
