//! Consistency auditor
//!
//! Reads the vector write status recorded on primary records and repairs
//! records whose vector write failed or never completed. Repairs rebuild the
//! vector projection from the *current* primary record on every attempt, so a
//! record edited after its first write is indexed with its latest content.
//!
//! Recoverable vector failures never surface as errors here; they are
//! recorded on the primary record and reported as `false`.

use dualstore_core::{
    now_millis, ConsistencyReport, ConsistencyStatus, DriverError, DualStoreConfig,
    DualStoreEntry, DualStoreError, DualStoreResult, EntryKind, EntryUpdate,
    PrimaryDatabaseDriver, RecordFilter, SortOrder, VectorRecord, VectorSearchDriver,
    VectorWriteStatus,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records examined by a window sweep when no limit is given
pub const DEFAULT_REPORT_LIMIT: usize = 1000;

/// Time window examined by `report` and `repair`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportScope {
    /// Inclusive lower bound (epoch ms)
    pub since: Option<i64>,
    /// Inclusive upper bound (epoch ms)
    pub until: Option<i64>,
    /// Most recent records to examine
    pub limit: usize,
}

impl Default for ReportScope {
    fn default() -> Self {
        ReportScope {
            since: None,
            until: None,
            limit: DEFAULT_REPORT_LIMIT,
        }
    }
}

impl ReportScope {
    /// Every record, up to the default limit
    pub fn all() -> Self {
        Self::default()
    }

    /// Set the lower bound
    pub fn since(mut self, ms: i64) -> Self {
        self.since = Some(ms);
        self
    }

    /// Set the upper bound
    pub fn until(mut self, ms: i64) -> Self {
        self.until = Some(ms);
        self
    }

    /// Set the record limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn filter(&self) -> RecordFilter {
        RecordFilter {
            since: self.since,
            until: self.until,
            ..Default::default()
        }
    }
}

/// Outcome of a repair sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Records in the window
    pub examined: usize,
    /// Records already consistent
    pub already_consistent: usize,
    /// Records kept out of the vector store on purpose, or that it cannot hold
    pub skipped: usize,
    /// Ids repaired by this sweep
    pub repaired: Vec<String>,
    /// Ids still failing after their retries
    pub still_failing: Vec<String>,
}

impl RepairSummary {
    /// Check if every repair attempt succeeded
    pub fn is_complete(&self) -> bool {
        self.still_failing.is_empty()
    }
}

/// Detects and repairs divergence between the stores
pub struct ConsistencyAuditor {
    config: Arc<DualStoreConfig>,
    primary: Arc<dyn PrimaryDatabaseDriver>,
    vector: Arc<dyn VectorSearchDriver>,
}

impl ConsistencyAuditor {
    /// Create an auditor over the two drivers
    pub fn new(
        config: Arc<DualStoreConfig>,
        primary: Arc<dyn PrimaryDatabaseDriver>,
        vector: Arc<dyn VectorSearchDriver>,
    ) -> Self {
        ConsistencyAuditor {
            config,
            primary,
            vector,
        }
    }

    /// Recorded consistency of one record
    ///
    /// A missing record yields `has_document = false` rather than an error.
    pub async fn check_consistency(
        &self,
        collection: &str,
        id: &str,
    ) -> DualStoreResult<ConsistencyStatus> {
        Ok(self.primary.check_consistency(collection, id).await?)
    }

    /// Re-attempt the vector write of one record
    ///
    /// Makes up to `max_retries` attempts (at least one) spaced by the
    /// collection's backoff schedule. Returns `true` once the vector store
    /// holds the record and the success is recorded, `false` after every
    /// attempt failed (the last error is recorded).
    ///
    /// Repeating the call after a success makes no vector write as long as
    /// the vector store still holds the id. A record inserted with dual write
    /// disabled is written on request; the success replaces its skip marker.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no primary record has the id; no vector call is made
    /// - `Primary` if reading or patching the primary record fails
    pub async fn retry_vector_write(
        &self,
        collection: &str,
        id: &str,
        max_retries: u32,
    ) -> DualStoreResult<bool> {
        let entry = self.load(collection, id).await?;

        if entry.kind == EntryKind::Image && !self.vector.supports_images() {
            debug!(target: "dualstore::auditor", collection, id, "Image entry cannot be indexed, skipping");
            return Ok(false);
        }
        if entry.vector_write_succeeded() && self.vector_holds(collection, id).await {
            debug!(target: "dualstore::auditor", collection, id, "Already consistent");
            return Ok(true);
        }

        let policy = self.config.resolve(collection).queue.retry_policy();
        let attempts = max_retries.max(1);
        let mut entry = entry;
        let mut last_error: Option<DriverError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(policy.delay_for(attempt - 1)).await;
                entry = self.load(collection, id).await?;
            }

            match self
                .vector
                .retry_vector_write(collection, &VectorRecord::from_entry(&entry))
                .await
            {
                Ok(()) => {
                    self.record(collection, id, VectorWriteStatus::succeeded(now_millis()))
                        .await?;
                    info!(target: "dualstore::auditor", collection, id, attempt, "Vector write repaired");
                    return Ok(true);
                }
                Err(e) => {
                    warn!(
                        target: "dualstore::auditor",
                        collection,
                        id,
                        attempt,
                        attempts,
                        error = %e,
                        "Vector write retry failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "vector write failed".to_string());
        self.record(collection, id, VectorWriteStatus::failed(message))
            .await?;
        Ok(false)
    }

    /// Drift report over the most recent records in a window
    pub async fn report(
        &self,
        collection: &str,
        scope: ReportScope,
    ) -> DualStoreResult<ConsistencyReport> {
        let entries = self.window(collection, &scope).await?;
        Ok(ConsistencyReport::from_entries(&entries))
    }

    /// Drift report over an explicit id list
    ///
    /// Ids without a primary record are not counted.
    pub async fn report_for_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> DualStoreResult<ConsistencyReport> {
        let mut report = ConsistencyReport::default();
        for id in ids {
            match self.primary.get(collection, id).await? {
                Some(entry) => report.record(&entry),
                None => debug!(target: "dualstore::auditor", collection, id = %id, "Reported id has no primary record"),
            }
        }
        Ok(report)
    }

    /// Retry every record in the window without a successful vector write
    ///
    /// Covers both failed writes and writes never recorded. Records whose
    /// insert skipped the vector write are left alone.
    pub async fn repair(
        &self,
        collection: &str,
        scope: ReportScope,
        max_retries: u32,
    ) -> DualStoreResult<RepairSummary> {
        let entries = self.window(collection, &scope).await?;
        let mut summary = RepairSummary {
            examined: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            if entry.vector_write_succeeded() {
                summary.already_consistent += 1;
                continue;
            }
            if entry.vector_write_skipped()
                || (entry.kind == EntryKind::Image && !self.vector.supports_images())
            {
                summary.skipped += 1;
                continue;
            }
            match self.retry_vector_write(collection, &entry.id, max_retries).await {
                Ok(true) => summary.repaired.push(entry.id),
                Ok(false) => summary.still_failing.push(entry.id),
                // Deleted between the scan and the retry
                Err(DualStoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        info!(
            target: "dualstore::auditor",
            collection,
            examined = summary.examined,
            repaired = summary.repaired.len(),
            failing = summary.still_failing.len(),
            "Repair sweep finished"
        );
        Ok(summary)
    }

    async fn load(&self, collection: &str, id: &str) -> DualStoreResult<DualStoreEntry> {
        self.primary
            .get(collection, id)
            .await?
            .ok_or_else(|| DualStoreError::not_found(collection, id))
    }

    async fn window(
        &self,
        collection: &str,
        scope: &ReportScope,
    ) -> DualStoreResult<Vec<DualStoreEntry>> {
        Ok(self
            .primary
            .get_most_recent(collection, scope.limit, &scope.filter(), SortOrder::NewestFirst)
            .await?)
    }

    async fn vector_holds(&self, collection: &str, id: &str) -> bool {
        match self.vector.get(collection, &[id.to_string()]).await {
            Ok(records) => records.iter().any(|r| r.id == id),
            Err(e) => {
                debug!(target: "dualstore::auditor", collection, id, error = %e, "Vector lookup failed, rewriting");
                false
            }
        }
    }

    async fn record(
        &self,
        collection: &str,
        id: &str,
        status: VectorWriteStatus,
    ) -> DualStoreResult<()> {
        self.primary
            .update(collection, id, &EntryUpdate::vector_write(status))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConsistencyAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyAuditor")
            .field("primary", &self.primary.name())
            .field("vector", &self.vector.name())
            .finish()
    }
}
