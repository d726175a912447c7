//! Conversions between wire values and PostgreSQL parameters and columns.
//!
//! Backing-store statements carry their parameters as `serde_json::Value`,
//! so the concrete PostgreSQL types are only known here: binding picks the
//! narrowest sqlx encoding for each JSON shape, and decoding inspects the
//! column's type info to pick the matching Rust decode before converting
//! back to JSON.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rowpod_storage::{Row as StorageRow, StoreError, StoreResult};
use serde_json::Value;
use sqlx_core::column::Column;
use sqlx_core::decode::Decode;
use sqlx_core::query::Query;
use sqlx_core::row::Row;
use sqlx_core::type_info::TypeInfo;
use sqlx_core::types::Type;
use sqlx_core::value::ValueRef;
use sqlx_postgres::{PgArguments, PgColumn, PgRow, Postgres};

/// Binds one JSON parameter onto `query`.
///
/// Arrays and objects are bound as JSONB; numbers prefer the integer
/// encoding and fall back to `f64`.
pub(crate) fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> StoreResult<Query<'q, Postgres, PgArguments>> {
    Ok(match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                return Err(StoreError::internal(format!(
                    "parameter {n} does not fit any PostgreSQL numeric binding"
                )));
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(value.clone()),
    })
}

/// Converts a fetched PostgreSQL row into the wire row shape.
pub(crate) fn decode_row(row: &PgRow) -> StoreResult<StorageRow> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        columns.push(column.name().to_string());
        values.push(decode_column(row, column)?);
    }
    StorageRow::new(columns, values)
}

/// Decodes one column of `row` into JSON, driven by its PostgreSQL type.
fn decode_column(row: &PgRow, column: &PgColumn) -> StoreResult<Value> {
    let idx = column.ordinal();
    let name = column.name();

    let raw = row
        .try_get_raw(idx)
        .map_err(|e| StoreError::decode(name, e.to_string()))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_name = column.type_info().name();
    match type_name {
        "BOOL" => Ok(Value::Bool(get_as::<bool>(row, idx, name)?)),
        "INT2" => Ok(Value::from(i64::from(get_as::<i16>(row, idx, name)?))),
        "INT4" => Ok(Value::from(i64::from(get_as::<i32>(row, idx, name)?))),
        "INT8" => Ok(Value::from(get_as::<i64>(row, idx, name)?)),
        "FLOAT4" => Ok(Value::from(f64::from(get_as::<f32>(row, idx, name)?))),
        "FLOAT8" => Ok(Value::from(get_as::<f64>(row, idx, name)?)),
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" => {
            Ok(Value::String(get_as::<String>(row, idx, name)?))
        }
        "UUID" => Ok(Value::String(
            get_as::<uuid::Uuid>(row, idx, name)?.to_string(),
        )),
        "JSON" | "JSONB" => get_as::<Value>(row, idx, name),
        "TIMESTAMPTZ" => Ok(Value::String(
            get_as::<DateTime<Utc>>(row, idx, name)?.to_rfc3339(),
        )),
        "TIMESTAMP" => Ok(Value::String(
            get_as::<NaiveDateTime>(row, idx, name)?.to_string(),
        )),
        "DATE" => Ok(Value::String(
            get_as::<NaiveDate>(row, idx, name)?.to_string(),
        )),
        "TIME" => Ok(Value::String(
            get_as::<NaiveTime>(row, idx, name)?.to_string(),
        )),
        other => Err(StoreError::decode(
            name,
            format!("unsupported PostgreSQL type {other}"),
        )),
    }
}

/// Extracts a column as `T`, wrapping failures with the column name.
fn get_as<'r, T>(row: &'r PgRow, idx: usize, column: &str) -> StoreResult<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<T, _>(idx)
        .map_err(|e| StoreError::decode(column, e.to_string()))
}
