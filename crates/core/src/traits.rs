//! Driver contracts
//!
//! The primary store and the vector store are external collaborators. These
//! traits are the only surface the queue, coordinator and auditor use, so any
//! store with id-keyed upsert/get/update and a sorted, filtered scan can back
//! the primary side, and any store with a bulk add of primitive metadata can
//! back the vector side.
//!
//! Thread safety: implementations are shared behind `Arc` across tasks and
//! must be `Send + Sync`.
//!
//! Every failure is returned as a [`DriverError`] carrying the operation,
//! driver name and document id.

use crate::consistency::ConsistencyStatus;
use crate::entry::{DualStoreEntry, EntryUpdate};
use crate::error::{DriverError, DriverResult};
use crate::filter::{RecordFilter, SortOrder};
use crate::value::VectorMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Durable primary record store
#[async_trait]
pub trait PrimaryDatabaseDriver: Send + Sync {
    /// Driver name used in error context and logs
    fn name(&self) -> &str;

    /// Upsert an entry by id
    async fn insert(&self, collection: &str, entry: &DualStoreEntry) -> DriverResult<()>;

    /// Fetch an entry by id
    async fn get(&self, collection: &str, id: &str) -> DriverResult<Option<DualStoreEntry>>;

    /// Fetch up to `limit` entries matching `filter`, ordered by timestamp
    async fn get_most_recent(
        &self,
        collection: &str,
        limit: usize,
        filter: &RecordFilter,
        sort: SortOrder,
    ) -> DriverResult<Vec<DualStoreEntry>>;

    /// Apply a partial update
    ///
    /// Returns `false` if no entry has the id.
    async fn update(&self, collection: &str, id: &str, update: &EntryUpdate) -> DriverResult<bool>;

    /// Read the recorded consistency of one entry
    async fn check_consistency(&self, collection: &str, id: &str) -> DriverResult<ConsistencyStatus> {
        let entry = self.get(collection, id).await?;
        Ok(ConsistencyStatus::from_entry(entry.as_ref()))
    }

    /// Release pooled connections and caches
    async fn cleanup(&self) -> DriverResult<()>;
}

/// A record held by the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Id shared with the primary store
    pub id: String,
    /// Indexed text
    pub document: String,
    /// Primitive metadata
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    /// Projection of a primary-store entry
    pub fn from_entry(entry: &DualStoreEntry) -> Self {
        VectorRecord {
            id: entry.id.clone(),
            document: entry.text.clone(),
            metadata: entry.vector_metadata(),
        }
    }
}

/// A query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Record id
    pub id: String,
    /// Indexed text
    pub document: String,
    /// Primitive metadata
    pub metadata: VectorMetadata,
    /// Similarity, higher = more similar
    pub score: f32,
}

/// Approximate-search index keyed by the primary-store ids
#[async_trait]
pub trait VectorSearchDriver: Send + Sync {
    /// Driver name used in error context and logs
    fn name(&self) -> &str;

    /// Whether image entries can be indexed
    fn supports_images(&self) -> bool {
        false
    }

    /// Idempotent bulk upsert of parallel id/document/metadata slices
    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        metadatas: &[VectorMetadata],
    ) -> DriverResult<()>;

    /// Nearest records for each query text
    async fn query(
        &self,
        collection: &str,
        texts: &[String],
        limit: usize,
        filter: Option<&RecordFilter>,
    ) -> DriverResult<Vec<Vec<VectorMatch>>>;

    /// Fetch records by id; unknown ids are omitted
    async fn get(&self, collection: &str, ids: &[String]) -> DriverResult<Vec<VectorRecord>>;

    /// Re-upsert a single record
    ///
    /// Used by repair. The default delegates to a one-element `add`.
    async fn retry_vector_write(&self, collection: &str, record: &VectorRecord) -> DriverResult<()> {
        self.add(
            collection,
            std::slice::from_ref(&record.id),
            std::slice::from_ref(&record.document),
            std::slice::from_ref(&record.metadata),
        )
        .await
        .map_err(|e: DriverError| {
            if e.document_id.is_none() {
                e.with_document(record.id.clone())
            } else {
                e
            }
        })
    }

    /// Release pooled connections and caches
    async fn cleanup(&self) -> DriverResult<()>;
}
