//! Dual-write coordinator
//!
//! Every insert goes through one sequence:
//! 1. assign an id and normalize the timestamp
//! 2. write the entry to the primary store (failures fail the call, no retry);
//!    an entry that will get no vector write is stored with a skip marker
//! 3. unless skipped, submit the vector projection through the collection's
//!    write queue and wait for its outcome
//! 4. record that outcome on the primary record
//!
//! The primary write always precedes the vector write for a record. Under
//! `Eventual` consistency a vector failure is recorded and logged but the
//! insert succeeds; under `Strict` it is returned as `CriticalVectorWrite`
//! after the primary record has been committed. Nothing is rolled back.

use dualstore_core::{
    now_millis, ConsistencyLevel, DualStoreConfig, DualStoreEntry, DualStoreError,
    DualStoreResult, EntryKind, EntryUpdate, NewEntry, PrimaryDatabaseDriver, SkipReason,
    VectorRecord, VectorSearchDriver, VectorWriteStatus,
};
use dualstore_queue::QueueRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Per-call overrides of the collection settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Override `dual_write`
    pub dual_write: Option<bool>,
    /// Override `consistency`
    pub consistency: Option<ConsistencyLevel>,
}

impl InsertOptions {
    /// Force a consistency level for this call
    pub fn consistency(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = Some(level);
        self
    }

    /// Enable or disable the vector write for this call
    pub fn dual_write(mut self, enabled: bool) -> Self {
        self.dual_write = Some(enabled);
        self
    }
}

/// What happened to the vector write of an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorWriteOutcome {
    /// Written to the vector store
    Written,
    /// Failed after the queue's retries; carries the recorded error
    Failed(String),
    /// Not attempted; the primary record carries the skip marker
    Skipped(SkipReason),
}

/// Result of a successful insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Id of the stored record
    pub id: String,
    /// Normalized timestamp (epoch ms)
    pub timestamp: i64,
    /// Vector write outcome
    pub vector: VectorWriteOutcome,
}

/// Insert counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// Inserts committed to the primary store
    pub inserts: u64,
    /// Inserts rejected by the primary store
    pub primary_failures: u64,
    /// Vector writes that succeeded
    pub vector_written: u64,
    /// Vector writes that failed
    pub vector_failed: u64,
    /// Vector writes not attempted
    pub vector_skipped: u64,
    /// Strict inserts escalated to the caller
    pub critical: u64,
}

/// Coordinates primary and vector writes for every collection
///
/// Counters use Relaxed ordering; they are observational only.
pub struct DualWriteCoordinator {
    config: Arc<DualStoreConfig>,
    primary: Arc<dyn PrimaryDatabaseDriver>,
    vector: Arc<dyn VectorSearchDriver>,
    queues: Arc<QueueRegistry>,
    inserts: AtomicU64,
    primary_failures: AtomicU64,
    vector_written: AtomicU64,
    vector_failed: AtomicU64,
    vector_skipped: AtomicU64,
    critical: AtomicU64,
}

impl DualWriteCoordinator {
    /// Create a coordinator sharing the given queue registry
    pub fn new(
        config: Arc<DualStoreConfig>,
        primary: Arc<dyn PrimaryDatabaseDriver>,
        vector: Arc<dyn VectorSearchDriver>,
        queues: Arc<QueueRegistry>,
    ) -> Self {
        DualWriteCoordinator {
            config,
            primary,
            vector,
            queues,
            inserts: AtomicU64::new(0),
            primary_failures: AtomicU64::new(0),
            vector_written: AtomicU64::new(0),
            vector_failed: AtomicU64::new(0),
            vector_skipped: AtomicU64::new(0),
            critical: AtomicU64::new(0),
        }
    }

    /// Insert with the collection's settings
    pub async fn insert(&self, collection: &str, entry: NewEntry) -> DualStoreResult<InsertOutcome> {
        self.insert_with(collection, entry, InsertOptions::default())
            .await
    }

    /// Insert with per-call overrides
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty collection name or unparseable timestamp
    /// - `Primary` if the primary insert or the status patch fails
    /// - `CriticalVectorWrite` for a failed vector write under `Strict`; the
    ///   primary record exists and carries the failure
    pub async fn insert_with(
        &self,
        collection: &str,
        entry: NewEntry,
        options: InsertOptions,
    ) -> DualStoreResult<InsertOutcome> {
        if collection.is_empty() {
            return Err(DualStoreError::invalid_input("collection name is empty"));
        }
        let mut entry = entry.into_entry()?;

        let settings = self.config.resolve(collection);
        let dual_write = options.dual_write.unwrap_or(settings.dual_write);
        let consistency = options.consistency.unwrap_or(settings.consistency);
        let skip = self.skip_reason(&entry, dual_write);
        entry.metadata.vector_write_skipped = skip;

        if let Err(e) = self.primary.insert(collection, &entry).await {
            self.primary_failures.fetch_add(1, Ordering::Relaxed);
            error!(target: "dualstore::coordinator", collection, id = %entry.id, error = %e, "Primary insert failed");
            return Err(e.into());
        }
        self.inserts.fetch_add(1, Ordering::Relaxed);
        debug!(target: "dualstore::coordinator", collection, id = %entry.id, "Primary insert committed");

        if let Some(reason) = skip {
            self.vector_skipped.fetch_add(1, Ordering::Relaxed);
            debug!(target: "dualstore::coordinator", collection, id = %entry.id, ?reason, "Vector write skipped");
            return Ok(InsertOutcome {
                id: entry.id,
                timestamp: entry.timestamp,
                vector: VectorWriteOutcome::Skipped(reason),
            });
        }

        let queue = self
            .queues
            .get_or_create(collection, &self.vector, &settings.queue)?;
        let result = queue.enqueue(VectorRecord::from_entry(&entry)).await;

        let (status, vector) = match &result {
            Ok(()) => (
                VectorWriteStatus::succeeded(now_millis()),
                VectorWriteOutcome::Written,
            ),
            Err(e) => {
                let message = e.to_string();
                (
                    VectorWriteStatus::failed(message.clone()),
                    VectorWriteOutcome::Failed(message),
                )
            }
        };
        self.record_status(collection, &entry.id, status).await?;

        match result {
            Ok(()) => {
                self.vector_written.fetch_add(1, Ordering::Relaxed);
                Ok(InsertOutcome {
                    id: entry.id,
                    timestamp: entry.timestamp,
                    vector,
                })
            }
            Err(e) if consistency == ConsistencyLevel::Strict => {
                self.vector_failed.fetch_add(1, Ordering::Relaxed);
                self.critical.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "dualstore::coordinator",
                    collection,
                    id = %entry.id,
                    error = %e,
                    "Vector write failed under strict consistency"
                );
                Err(DualStoreError::CriticalVectorWrite {
                    collection: collection.to_string(),
                    id: entry.id,
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                self.vector_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "dualstore::coordinator",
                    collection,
                    id = %entry.id,
                    error = %e,
                    "Vector write failed, record left for repair"
                );
                Ok(InsertOutcome {
                    id: entry.id,
                    timestamp: entry.timestamp,
                    vector,
                })
            }
        }
    }

    /// Current counters
    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            inserts: self.inserts.load(Ordering::Relaxed),
            primary_failures: self.primary_failures.load(Ordering::Relaxed),
            vector_written: self.vector_written.load(Ordering::Relaxed),
            vector_failed: self.vector_failed.load(Ordering::Relaxed),
            vector_skipped: self.vector_skipped.load(Ordering::Relaxed),
            critical: self.critical.load(Ordering::Relaxed),
        }
    }

    fn skip_reason(&self, entry: &DualStoreEntry, dual_write: bool) -> Option<SkipReason> {
        if !dual_write {
            return Some(SkipReason::DualWriteDisabled);
        }
        if entry.kind == EntryKind::Image && !self.vector.supports_images() {
            return Some(SkipReason::ImagesUnsupported);
        }
        None
    }

    async fn record_status(
        &self,
        collection: &str,
        id: &str,
        status: VectorWriteStatus,
    ) -> DualStoreResult<()> {
        let found = self
            .primary
            .update(collection, id, &EntryUpdate::vector_write(status))
            .await
            .map_err(|e| {
                error!(target: "dualstore::coordinator", collection, id, error = %e, "Could not record vector write status");
                DualStoreError::from(e)
            })?;
        if !found {
            warn!(target: "dualstore::coordinator", collection, id, "Record vanished before its vector write status was recorded");
        }
        Ok(())
    }
}

impl std::fmt::Debug for DualWriteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualWriteCoordinator")
            .field("primary", &self.primary.name())
            .field("vector", &self.vector.name())
            .field("metrics", &self.metrics())
            .finish()
    }
}
