//! Row-to-entity parsing helpers.
//!
//! Repos convert column-indexed `libsql::Row`s into typed entities. These
//! helpers handle the dual datetime format (`SQLite`'s `datetime('now')` vs
//! Rust's `to_rfc3339()`) and the text-encoded enums.

use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00+00:00"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with all fed-core enums that use `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string does not match any enum variant.
pub fn parse_enum<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Convert a stored INTEGER count back to `u64`.
///
/// # Errors
///
/// Returns `DatabaseError::InvalidState` for negative values.
pub fn count_from_sql(value: Option<i64>) -> Result<Option<u64>, DatabaseError> {
    value
        .map(|v| {
            u64::try_from(v)
                .map_err(|_| DatabaseError::InvalidState(format!("negative match count {v}")))
        })
        .transpose()
}

/// Convert a match count into an SQL INTEGER value (NULL for `None`).
///
/// # Errors
///
/// Returns `DatabaseError::InvalidState` for counts beyond `i64::MAX`.
pub fn count_to_sql(value: Option<u64>) -> Result<libsql::Value, DatabaseError> {
    match value {
        None => Ok(libsql::Value::Null),
        Some(v) => i64::try_from(v)
            .map(libsql::Value::Integer)
            .map_err(|_| DatabaseError::InvalidState(format!("match count {v} out of range"))),
    }
}
