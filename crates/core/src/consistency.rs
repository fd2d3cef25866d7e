//! Consistency status and drift reports
//!
//! Both are derived from primary-store metadata alone; neither is persisted.

use crate::entry::{DualStoreEntry, SkipReason};
use serde::{Deserialize, Serialize};

/// Classification of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyState {
    /// No primary record
    Missing,
    /// Primary record whose vector write has not been recorded yet
    Pending,
    /// Primary record deliberately kept out of the vector store
    Skipped,
    /// Vector write recorded as successful
    Consistent,
    /// Vector write recorded as failed
    Inconsistent,
}

/// Result of `check_consistency` for one id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyStatus {
    /// Whether the primary store holds the record
    pub has_document: bool,
    /// Recorded outcome of the last vector write
    pub vector_write_success: Option<bool>,
    /// Recorded error of the last failed vector write
    pub vector_write_error: Option<String>,
    /// Recorded time of the last successful vector write
    pub vector_write_timestamp: Option<i64>,
    /// Why the insert made no vector write, if it skipped one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_write_skipped: Option<SkipReason>,
}

impl ConsistencyStatus {
    /// Status for an absent record
    pub fn missing() -> Self {
        Self::default()
    }

    /// Status derived from a primary-store read
    pub fn from_entry(entry: Option<&DualStoreEntry>) -> Self {
        let Some(entry) = entry else {
            return Self::missing();
        };
        match &entry.metadata.vector_write {
            Some(status) => ConsistencyStatus {
                has_document: true,
                vector_write_success: Some(status.success),
                vector_write_error: status.error.clone(),
                vector_write_timestamp: status.timestamp,
                vector_write_skipped: None,
            },
            None => ConsistencyStatus {
                has_document: true,
                vector_write_skipped: entry.metadata.vector_write_skipped,
                ..Default::default()
            },
        }
    }

    /// Classify the status
    pub fn state(&self) -> ConsistencyState {
        match (self.has_document, self.vector_write_success) {
            (false, _) => ConsistencyState::Missing,
            (true, None) if self.vector_write_skipped.is_some() => ConsistencyState::Skipped,
            (true, None) => ConsistencyState::Pending,
            (true, Some(true)) => ConsistencyState::Consistent,
            (true, Some(false)) => ConsistencyState::Inconsistent,
        }
    }
}

/// A record whose vector write is recorded as failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyFailure {
    /// Record id
    pub id: String,
    /// Recorded error
    pub error: Option<String>,
    /// Record timestamp (epoch ms)
    pub timestamp: i64,
}

/// Aggregate drift view over a set of records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Records examined
    pub total: usize,
    /// Records with a successful vector write
    pub consistent: usize,
    /// Records with a failed vector write
    pub inconsistent: usize,
    /// Records with no recorded vector write yet
    pub pending: usize,
    /// Records deliberately kept out of the vector store
    pub skipped: usize,
    /// Records expected in the vector store but not confirmed there
    /// (`inconsistent + pending`)
    pub missing_vectors: usize,
    /// Every failed record
    pub failures: Vec<ConsistencyFailure>,
}

impl ConsistencyReport {
    /// Fold one record into the report
    pub fn record(&mut self, entry: &DualStoreEntry) {
        self.total += 1;
        match &entry.metadata.vector_write {
            Some(status) if status.success => self.consistent += 1,
            Some(status) => {
                self.inconsistent += 1;
                self.missing_vectors += 1;
                self.failures.push(ConsistencyFailure {
                    id: entry.id.clone(),
                    error: status.error.clone(),
                    timestamp: entry.timestamp,
                });
            }
            None if entry.metadata.vector_write_skipped.is_some() => self.skipped += 1,
            None => {
                self.pending += 1;
                self.missing_vectors += 1;
            }
        }
    }

    /// Build a report from a set of records
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a DualStoreEntry>) -> Self {
        let mut report = Self::default();
        for entry in entries {
            report.record(entry);
        }
        report
    }

    /// Check if every examined record is consistent or deliberately skipped
    pub fn is_clean(&self) -> bool {
        self.consistent + self.skipped == self.total
    }
}
