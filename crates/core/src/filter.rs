//! Record filters for sorted reads
//!
//! Supports top-level metadata equality plus an inclusive timestamp range,
//! the subset every primary store and vector store this crate targets can
//! express natively.

use crate::entry::{DualStoreEntry, EntryKind};
use crate::timestamp::METADATA_TIMESTAMP_KEY;
use crate::value::{MetadataValue, VectorMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sort order for `get_most_recent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Highest timestamp first
    #[default]
    NewestFirst,
    /// Lowest timestamp first
    OldestFirst,
}

/// Filter over entries (AND semantics across all conditions)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Top-level field equality
    pub equals: BTreeMap<String, MetadataValue>,
    /// Inclusive lower timestamp bound (epoch ms)
    pub since: Option<i64>,
    /// Inclusive upper timestamp bound (epoch ms)
    pub until: Option<i64>,
    /// Restrict to one entry kind
    pub kind: Option<EntryKind>,
}

impl RecordFilter {
    /// Create an empty filter (matches all)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Set the lower timestamp bound
    pub fn since(mut self, ms: i64) -> Self {
        self.since = Some(ms);
        self
    }

    /// Set the upper timestamp bound
    pub fn until(mut self, ms: i64) -> Self {
        self.until = Some(ms);
        self
    }

    /// Restrict to one kind
    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Check if the filter has no conditions
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.since.is_none() && self.until.is_none() && self.kind.is_none()
    }

    fn in_range(&self, ts: i64) -> bool {
        self.since.map_or(true, |s| ts >= s) && self.until.map_or(true, |u| ts <= u)
    }

    /// Check a primary-store entry
    pub fn matches_entry(&self, entry: &DualStoreEntry) -> bool {
        if !self.in_range(entry.timestamp) {
            return false;
        }
        if self.kind.is_some_and(|k| k != entry.kind) {
            return false;
        }
        self.equals.iter().all(|(key, expected)| {
            entry
                .metadata
                .get(key)
                .is_some_and(|actual| expected.matches(actual))
        })
    }

    /// Check a vector-store metadata map
    ///
    /// The timestamp range is evaluated against the `timestamp` attribute;
    /// a map without one fails a ranged filter.
    pub fn matches_metadata(&self, metadata: &VectorMetadata) -> bool {
        if self.since.is_some() || self.until.is_some() {
            let Some(ts) = metadata.get(METADATA_TIMESTAMP_KEY).and_then(|v| v.as_f64()) else {
                return false;
            };
            if !self.in_range(ts as i64) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if metadata.get(crate::entry::ENTRY_TYPE_KEY).and_then(|v| v.as_str()) != Some(kind.name()) {
                return false;
            }
        }
        self.equals.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|actual| expected.matches(actual))
        })
    }
}
