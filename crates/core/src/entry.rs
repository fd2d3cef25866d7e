//! Dual-store entries
//!
//! [`DualStoreEntry`] is the unit of storage. It lives in the primary store in
//! full, and its projection (id, text, primitive metadata) lives in the vector
//! store. The primary copy also carries the outcome of the last vector write
//! in [`EntryMetadata::vector_write`], so consistency can be read without
//! touching the vector store.
//!
//! Callers build a [`NewEntry`]; the coordinator turns it into a
//! `DualStoreEntry` by assigning an id and normalizing the timestamp.

use crate::error::DualStoreResult;
use crate::timestamp::{resolve_timestamp, TimestampInput, METADATA_TIMESTAMP_KEY};
use crate::value::{MetadataValue, VectorMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved metadata key: did the last vector write succeed
pub const VECTOR_WRITE_SUCCESS_KEY: &str = "vectorWriteSuccess";
/// Reserved metadata key: error of the last failed vector write
pub const VECTOR_WRITE_ERROR_KEY: &str = "vectorWriteError";
/// Reserved metadata key: time of the last successful vector write
pub const VECTOR_WRITE_TIMESTAMP_KEY: &str = "vectorWriteTimestamp";
/// Reserved metadata key: why the vector write was deliberately skipped
pub const VECTOR_WRITE_SKIPPED_KEY: &str = "vectorWriteSkipped";
/// Metadata key carrying the entry kind in the vector projection
pub const ENTRY_TYPE_KEY: &str = "type";

const RESERVED_KEYS: [&str; 4] = [
    VECTOR_WRITE_SUCCESS_KEY,
    VECTOR_WRITE_ERROR_KEY,
    VECTOR_WRITE_TIMESTAMP_KEY,
    VECTOR_WRITE_SKIPPED_KEY,
];

/// Kind of content an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Plain text
    #[default]
    Text,
    /// Image reference; only indexed by vector drivers with image support
    Image,
}

impl EntryKind {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            EntryKind::Text => "text",
            EntryKind::Image => "image",
        }
    }
}

/// Why no vector write was attempted for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Dual write disabled for the collection or the call
    DualWriteDisabled,
    /// Image entry and the vector driver cannot index images
    ImagesUnsupported,
}

impl SkipReason {
    /// Stable name used in flattened metadata
    pub fn name(&self) -> &'static str {
        match self {
            SkipReason::DualWriteDisabled => "dual_write_disabled",
            SkipReason::ImagesUnsupported => "images_unsupported",
        }
    }
}

/// Outcome of the most recent vector write for an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorWriteStatus {
    /// Whether the vector projection was written
    pub success: bool,
    /// Error of the failed write, cleared on success
    pub error: Option<String>,
    /// Epoch milliseconds of the successful write; `None` after a failure
    pub timestamp: Option<i64>,
}

impl VectorWriteStatus {
    /// A successful write at `at` (epoch milliseconds)
    pub fn succeeded(at: i64) -> Self {
        VectorWriteStatus {
            success: true,
            error: None,
            timestamp: Some(at),
        }
    }

    /// A failed write
    pub fn failed(error: impl Into<String>) -> Self {
        VectorWriteStatus {
            success: false,
            error: Some(error.into()),
            timestamp: None,
        }
    }
}

/// Metadata stored with an entry in the primary store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Reserved consistency fields; `None` until a vector write is recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_write: Option<VectorWriteStatus>,
    /// Set when the insert deliberately made no vector write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_write_skipped: Option<SkipReason>,
    /// Domain attributes (primitive values only)
    #[serde(default)]
    pub extra: BTreeMap<String, MetadataValue>,
}

impl EntryMetadata {
    /// Build metadata from caller-supplied JSON
    ///
    /// Complex values are stringified. Reserved consistency keys are dropped:
    /// only the coordinator and the auditor may set them.
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let extra = map
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), MetadataValue::from_json(v)))
            .collect();
        EntryMetadata {
            vector_write: None,
            vector_write_skipped: None,
            extra,
        }
    }

    /// Look up a domain attribute
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.extra.get(key)
    }

    /// Flattened view including the reserved fields under their wire names
    pub fn flattened(&self) -> BTreeMap<String, MetadataValue> {
        let mut out = self.extra.clone();
        if let Some(status) = &self.vector_write {
            out.insert(VECTOR_WRITE_SUCCESS_KEY.to_string(), status.success.into());
            out.insert(
                VECTOR_WRITE_ERROR_KEY.to_string(),
                status.error.clone().into(),
            );
            out.insert(
                VECTOR_WRITE_TIMESTAMP_KEY.to_string(),
                status.timestamp.into(),
            );
        }
        if let Some(reason) = self.vector_write_skipped {
            out.insert(VECTOR_WRITE_SKIPPED_KEY.to_string(), reason.name().into());
        }
        out
    }
}

/// A record as stored in the primary store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualStoreEntry {
    /// Stable id shared by both stores
    pub id: String,
    /// Indexed content
    pub text: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Content kind
    #[serde(default)]
    pub kind: EntryKind,
    /// Domain metadata plus consistency fields
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl DualStoreEntry {
    /// Metadata for the vector projection
    ///
    /// Built from the current domain attributes plus the normalized timestamp
    /// and the entry kind. Consistency fields never reach the vector store.
    pub fn vector_metadata(&self) -> VectorMetadata {
        let mut meta = self.metadata.extra.clone();
        meta.insert(
            METADATA_TIMESTAMP_KEY.to_string(),
            MetadataValue::from(self.timestamp),
        );
        meta.insert(ENTRY_TYPE_KEY.to_string(), self.kind.name().into());
        meta
    }

    /// Whether a vector write has been recorded as successful
    pub fn vector_write_succeeded(&self) -> bool {
        self.metadata
            .vector_write
            .as_ref()
            .is_some_and(|s| s.success)
    }

    /// Whether the insert deliberately left the vector store untouched
    ///
    /// A later recorded write clears the marker.
    pub fn vector_write_skipped(&self) -> bool {
        self.metadata.vector_write.is_none() && self.metadata.vector_write_skipped.is_some()
    }
}

// =============================================================================
// NewEntry
// =============================================================================

/// Insert payload supplied by a caller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEntry {
    /// Caller-chosen id; a UUID is generated when absent
    pub id: Option<String>,
    /// Content to index
    pub text: String,
    /// Entry-level timestamp (highest precedence)
    pub timestamp: Option<TimestampInput>,
    /// Content kind
    pub kind: EntryKind,
    /// Raw caller metadata
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NewEntry {
    /// Create a text entry
    pub fn new(text: impl Into<String>) -> Self {
        NewEntry {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the entry-level timestamp
    pub fn with_timestamp(mut self, ts: impl Into<TimestampInput>) -> Self {
        self.timestamp = Some(ts.into());
        self
    }

    /// Set the kind
    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add a metadata attribute
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Resolve into a storable entry
    ///
    /// Assigns a UUID v4 when no id (or an empty id) was given, and
    /// normalizes the timestamp by precedence.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a supplied timestamp cannot be parsed.
    pub fn into_entry(self) -> DualStoreResult<DualStoreEntry> {
        let timestamp = resolve_timestamp(self.timestamp.as_ref(), &self.metadata)?;
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let mut metadata = EntryMetadata::from_json_map(&self.metadata);
        // The normalized value replaces whatever representation the caller used
        metadata.extra.remove(METADATA_TIMESTAMP_KEY);
        Ok(DualStoreEntry {
            id,
            text: self.text,
            timestamp,
            kind: self.kind,
            metadata,
        })
    }
}

// =============================================================================
// EntryUpdate
// =============================================================================

/// Partial update applied by `PrimaryDatabaseDriver::update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryUpdate {
    /// Replacement text
    pub text: Option<String>,
    /// Replacement consistency status
    pub vector_write: Option<VectorWriteStatus>,
    /// Attributes merged into `metadata.extra`
    pub extra: BTreeMap<String, MetadataValue>,
}

impl EntryUpdate {
    /// Update that only records a vector write outcome
    pub fn vector_write(status: VectorWriteStatus) -> Self {
        EntryUpdate {
            vector_write: Some(status),
            ..Default::default()
        }
    }

    /// Merge an attribute
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Apply to an entry in place
    pub fn apply(&self, entry: &mut DualStoreEntry) {
        if let Some(text) = &self.text {
            entry.text = text.clone();
        }
        if let Some(status) = &self.vector_write {
            entry.metadata.vector_write = Some(status.clone());
            entry.metadata.vector_write_skipped = None;
        }
        for (k, v) in &self.extra {
            entry.metadata.extra.insert(k.clone(), v.clone());
        }
    }
}
