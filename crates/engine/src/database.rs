//! DualStore: the composition root
//!
//! Wires one configuration, one queue registry and the two drivers into a
//! coordinator and an auditor that share them. Callers hold a `DualStore`
//! (usually behind an `Arc`) and tear it down with [`DualStore::cleanup`].

use crate::auditor::{ConsistencyAuditor, RepairSummary, ReportScope};
use crate::coordinator::{CoordinatorMetrics, DualWriteCoordinator, InsertOptions, InsertOutcome};
use crate::memory::{MemoryCluster, MemoryPrimaryDriver, MemoryVectorDriver};
use dualstore_core::{
    ConsistencyReport, ConsistencyStatus, DualStoreConfig, DualStoreEntry, DualStoreError,
    DualStoreResult, NewEntry, PrimaryDatabaseDriver, RecordFilter, SortOrder, VectorMatch,
    VectorSearchDriver,
};
use dualstore_queue::{QueueRegistry, QueueStats};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Primary and vector store kept in step
pub struct DualStore {
    config: Arc<DualStoreConfig>,
    primary: Arc<dyn PrimaryDatabaseDriver>,
    vector: Arc<dyn VectorSearchDriver>,
    queues: Arc<QueueRegistry>,
    coordinator: DualWriteCoordinator,
    auditor: ConsistencyAuditor,
}

impl DualStore {
    /// Build a store over the given drivers
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the configuration fails validation.
    pub fn new(
        config: DualStoreConfig,
        primary: Arc<dyn PrimaryDatabaseDriver>,
        vector: Arc<dyn VectorSearchDriver>,
    ) -> DualStoreResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let queues = Arc::new(QueueRegistry::new());

        let coordinator = DualWriteCoordinator::new(
            Arc::clone(&config),
            Arc::clone(&primary),
            Arc::clone(&vector),
            Arc::clone(&queues),
        );
        let auditor = ConsistencyAuditor::new(
            Arc::clone(&config),
            Arc::clone(&primary),
            Arc::clone(&vector),
        );

        info!(
            target: "dualstore::db",
            primary = primary.name(),
            vector = vector.name(),
            dual_write = config.dual_write,
            consistency = config.consistency.name(),
            "Dual store opened"
        );

        Ok(DualStore {
            config,
            primary,
            vector,
            queues,
            coordinator,
            auditor,
        })
    }

    /// Build a store over a memory cluster
    pub fn in_memory(config: DualStoreConfig, cluster: &Arc<MemoryCluster>) -> DualStoreResult<Self> {
        Self::new(
            config,
            Arc::new(MemoryPrimaryDriver::new(Arc::clone(cluster))),
            Arc::new(MemoryVectorDriver::new(Arc::clone(cluster))),
        )
    }

    /// Build a store configured from `dualstore.toml` in `dir` plus the environment
    pub fn from_config_dir(
        dir: &Path,
        primary: Arc<dyn PrimaryDatabaseDriver>,
        vector: Arc<dyn VectorSearchDriver>,
    ) -> DualStoreResult<Self> {
        Self::new(DualStoreConfig::discover(dir)?, primary, vector)
    }

    /// Active configuration
    pub fn config(&self) -> &DualStoreConfig {
        &self.config
    }

    /// The shared queue registry
    pub fn queues(&self) -> &Arc<QueueRegistry> {
        &self.queues
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert an entry with the collection's settings
    pub async fn insert(&self, collection: &str, entry: NewEntry) -> DualStoreResult<InsertOutcome> {
        self.coordinator.insert(collection, entry).await
    }

    /// Insert an entry with per-call overrides
    pub async fn insert_with(
        &self,
        collection: &str,
        entry: NewEntry,
        options: InsertOptions,
    ) -> DualStoreResult<InsertOutcome> {
        self.coordinator.insert_with(collection, entry, options).await
    }

    /// Flush every write queue now
    pub async fn flush(&self) -> DualStoreResult<()> {
        Ok(self.queues.flush_all().await?)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Primary record by id
    pub async fn get(&self, collection: &str, id: &str) -> DualStoreResult<Option<DualStoreEntry>> {
        Ok(self.primary.get(collection, id).await?)
    }

    /// Most recent primary records matching a filter, newest first
    pub async fn recent(
        &self,
        collection: &str,
        limit: usize,
        filter: &RecordFilter,
    ) -> DualStoreResult<Vec<DualStoreEntry>> {
        Ok(self
            .primary
            .get_most_recent(collection, limit, filter, SortOrder::NewestFirst)
            .await?)
    }

    /// Similarity search against the vector store
    pub async fn search(
        &self,
        collection: &str,
        text: &str,
        limit: usize,
        filter: Option<&RecordFilter>,
    ) -> DualStoreResult<Vec<VectorMatch>> {
        let mut results = self
            .vector
            .query(collection, &[text.to_string()], limit, filter)
            .await?;
        Ok(results.pop().unwrap_or_default())
    }

    // ========================================================================
    // Consistency
    // ========================================================================

    /// Recorded consistency of one record
    pub async fn check_consistency(
        &self,
        collection: &str,
        id: &str,
    ) -> DualStoreResult<ConsistencyStatus> {
        self.auditor.check_consistency(collection, id).await
    }

    /// Retry one record's vector write with the configured attempt count
    pub async fn retry_vector_write(&self, collection: &str, id: &str) -> DualStoreResult<bool> {
        self.auditor
            .retry_vector_write(collection, id, self.config.repair_max_retries)
            .await
    }

    /// Retry one record's vector write with an explicit attempt count
    pub async fn retry_vector_write_with(
        &self,
        collection: &str,
        id: &str,
        max_retries: u32,
    ) -> DualStoreResult<bool> {
        self.auditor
            .retry_vector_write(collection, id, max_retries)
            .await
    }

    /// Drift report over a time window
    pub async fn report(
        &self,
        collection: &str,
        scope: ReportScope,
    ) -> DualStoreResult<ConsistencyReport> {
        self.auditor.report(collection, scope).await
    }

    /// Drift report over explicit ids
    pub async fn report_for_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> DualStoreResult<ConsistencyReport> {
        self.auditor.report_for_ids(collection, ids).await
    }

    /// Repair every inconsistent record in a window
    pub async fn repair(&self, collection: &str, scope: ReportScope) -> DualStoreResult<RepairSummary> {
        self.auditor
            .repair(collection, scope, self.config.repair_max_retries)
            .await
    }

    // ========================================================================
    // Health and teardown
    // ========================================================================

    /// Stats of every write queue, sorted by collection
    pub fn queue_stats(&self) -> Vec<QueueStats> {
        self.queues.stats()
    }

    /// Insert counters
    pub fn metrics(&self) -> CoordinatorMetrics {
        self.coordinator.metrics()
    }

    /// Drain every write queue, then release both drivers' clients
    ///
    /// Every step runs even if an earlier one fails; the first error is
    /// returned. The store stays usable: queues and clients are recreated
    /// on demand.
    pub async fn cleanup(&self) -> DualStoreResult<()> {
        let mut first_error: Option<DualStoreError> = None;

        if let Err(e) = self.queues.shutdown_all().await {
            warn!(target: "dualstore::db", error = %e, "Write queue shutdown failed");
            first_error.get_or_insert(e.into());
        }
        if let Err(e) = self.primary.cleanup().await {
            warn!(target: "dualstore::db", error = %e, "Primary driver cleanup failed");
            first_error.get_or_insert(e.into());
        }
        if let Err(e) = self.vector.cleanup().await {
            warn!(target: "dualstore::db", error = %e, "Vector driver cleanup failed");
            first_error.get_or_insert(e.into());
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(target: "dualstore::db", "Dual store cleaned up");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for DualStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualStore")
            .field("primary", &self.primary.name())
            .field("vector", &self.vector.name())
            .field("queues", &self.queues.collections())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualstore_core::{WriteQueueConfig, CONFIG_FILE_NAME};

    fn config() -> DualStoreConfig {
        DualStoreConfig {
            queue: WriteQueueConfig::default()
                .with_batch_size(1)
                .with_retry_delay_ms(10)
                .with_jitter(false),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_search_and_get() {
        let cluster = MemoryCluster::new();
        let store = DualStore::in_memory(config(), &cluster).unwrap();

        store
            .insert("notes", NewEntry::new("tokio runtime tuning").with_id("n1"))
            .await
            .unwrap();
        store
            .insert("notes", NewEntry::new("sourdough starter").with_id("n2"))
            .await
            .unwrap();

        let hits = store.search("notes", "tokio", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "n1");

        assert!(store.get("notes", "n2").await.unwrap().is_some());
        assert_eq!(store.recent("notes", 10, &RecordFilter::new()).await.unwrap().len(), 2);
        assert_eq!(store.metrics().vector_written, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_rejected() {
        let cluster = MemoryCluster::new();
        let bad = DualStoreConfig {
            queue: WriteQueueConfig::default().with_batch_size(0),
            ..Default::default()
        };
        let err = DualStore::in_memory(bad, &cluster).unwrap_err();
        assert!(matches!(err, DualStoreError::Config { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drains_queues_and_closes_clients() {
        let cluster = MemoryCluster::new();
        let store = DualStore::in_memory(config(), &cluster).unwrap();
        store.insert("notes", NewEntry::new("x").with_id("n1")).await.unwrap();
        assert_eq!(store.queue_stats().len(), 1);

        store.cleanup().await.unwrap();
        assert!(store.queue_stats().is_empty());
        assert_eq!(cluster.stats().connections_closed, 2);

        // Usable again after cleanup
        store.insert("notes", NewEntry::new("y").with_id("n2")).await.unwrap();
        assert!(cluster.vector_record("notes", "n2").is_some());
    }

    #[tokio::test]
    async fn test_from_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "repair_max_retries = 7\n[queue]\nbatch_size = 4\n",
        )
        .unwrap();

        let cluster = MemoryCluster::new();
        let store = DualStore::from_config_dir(
            dir.path(),
            Arc::new(MemoryPrimaryDriver::new(Arc::clone(&cluster))),
            Arc::new(MemoryVectorDriver::new(Arc::clone(&cluster))),
        )
        .unwrap();
        assert_eq!(store.config().repair_max_retries, 7);
        assert_eq!(store.config().queue.batch_size, 4);
    }
}
