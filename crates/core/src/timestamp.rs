//! Timestamp normalization
//!
//! Every entry carries its timestamp as epoch milliseconds before either store
//! sees it, so sort order does not depend on how a store compares dates.
//! Callers may hand in milliseconds, RFC 3339 strings, numeric strings, bare
//! `YYYY-MM-DD` dates (midnight UTC) or
//! `chrono` datetimes.
//!
//! Resolution precedence for an insert:
//! 1. the entry-level timestamp
//! 2. `metadata["timestamp"]`
//! 3. the legacy `metadata["dateTime"]` field
//! 4. now

use crate::error::{DualStoreError, DualStoreResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Metadata key checked for an embedded timestamp
pub const METADATA_TIMESTAMP_KEY: &str = "timestamp";

/// Legacy metadata key checked when no other timestamp is present
pub const LEGACY_TIMESTAMP_KEY: &str = "dateTime";

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A timestamp as supplied by a caller, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampInput {
    /// Epoch milliseconds
    Millis(i64),
    /// RFC 3339 text, `YYYY-MM-DD HH:MM:SS` (UTC) or a numeric string
    Text(String),
    /// A datetime value
    DateTime(DateTime<Utc>),
}

impl TimestampInput {
    /// Interpret a JSON value as a timestamp
    ///
    /// Returns `None` for null and for values that cannot carry a time
    /// (booleans, objects, arrays).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(TimestampInput::Millis),
            serde_json::Value::String(s) => Some(TimestampInput::Text(s.clone())),
            _ => None,
        }
    }

    /// Normalize to epoch milliseconds
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if text cannot be parsed as a time.
    pub fn to_millis(&self) -> DualStoreResult<i64> {
        match self {
            TimestampInput::Millis(ms) => Ok(*ms),
            TimestampInput::DateTime(dt) => Ok(dt.timestamp_millis()),
            TimestampInput::Text(text) => parse_text(text),
        }
    }
}

impl From<i64> for TimestampInput {
    fn from(ms: i64) -> Self {
        TimestampInput::Millis(ms)
    }
}

impl From<DateTime<Utc>> for TimestampInput {
    fn from(dt: DateTime<Utc>) -> Self {
        TimestampInput::DateTime(dt)
    }
}

impl From<&str> for TimestampInput {
    fn from(s: &str) -> Self {
        TimestampInput::Text(s.to_string())
    }
}

impl From<String> for TimestampInput {
    fn from(s: String) -> Self {
        TimestampInput::Text(s)
    }
}

fn parse_text(text: &str) -> DualStoreResult<i64> {
    let trimmed = text.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(ms) = trimmed.parse::<f64>() {
        if ms.is_finite() {
            return Ok(ms.trunc() as i64);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }
    Err(DualStoreError::invalid_input(format!(
        "unrecognized timestamp '{}'",
        text
    )))
}

/// Resolve the effective timestamp of an insert
///
/// Follows the precedence listed in the module docs. A present but
/// unparseable value is an error rather than a silent fallthrough.
pub fn resolve_timestamp(
    entry_level: Option<&TimestampInput>,
    metadata: &serde_json::Map<String, serde_json::Value>,
) -> DualStoreResult<i64> {
    if let Some(input) = entry_level {
        return input.to_millis();
    }
    for key in [METADATA_TIMESTAMP_KEY, LEGACY_TIMESTAMP_KEY] {
        if let Some(input) = metadata.get(key).and_then(TimestampInput::from_json) {
            return input.to_millis();
        }
    }
    Ok(now_millis())
}
