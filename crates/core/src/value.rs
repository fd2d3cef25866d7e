//! Primitive metadata values
//!
//! The vector store only accepts primitive metadata: strings, numbers,
//! booleans and null. [`MetadataValue`] is that closed set. Complex JSON
//! (objects, arrays) is stringified when it enters through
//! [`MetadataValue::from_json`], so nothing non-primitive can reach a queue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primitive-only metadata map handed to the vector store
pub type VectorMetadata = BTreeMap<String, MetadataValue>;

/// A primitive metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (stored as f64)
    Number(f64),
    /// String value
    String(String),
}

impl MetadataValue {
    /// Convert a JSON value, stringifying objects and arrays
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => MetadataValue::Null,
            serde_json::Value::Bool(b) => MetadataValue::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(MetadataValue::Number)
                .unwrap_or_else(|| MetadataValue::String(n.to_string())),
            serde_json::Value::String(s) => MetadataValue::String(s.clone()),
            complex => MetadataValue::String(complex.to_string()),
        }
    }

    /// Convert back to JSON
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MetadataValue::Null => serde_json::Value::Null,
            MetadataValue::Bool(b) => serde_json::Value::Bool(*b),
            MetadataValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            MetadataValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Check if this scalar matches a JSON value
    pub fn matches_json(&self, value: &serde_json::Value) -> bool {
        match (self, value) {
            (MetadataValue::Null, serde_json::Value::Null) => true,
            (MetadataValue::Bool(a), serde_json::Value::Bool(b)) => a == b,
            (MetadataValue::Number(a), serde_json::Value::Number(b)) => {
                b.as_f64().is_some_and(|n| (a - n).abs() < f64::EPSILON)
            }
            (MetadataValue::String(a), serde_json::Value::String(b)) => a == b,
            _ => false,
        }
    }

    /// Loose equality used by filters (numbers compared with epsilon)
    pub fn matches(&self, other: &MetadataValue) -> bool {
        match (self, other) {
            (MetadataValue::Number(a), MetadataValue::Number(b)) => (a - b).abs() < f64::EPSILON,
            _ => self == other,
        }
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric contents, if this is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean contents, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(MetadataValue::Null)
    }
}
