//! Per-collection queue registry
//!
//! Each named collection owns one write queue. The registry is an explicit
//! object held by the composition root and shared by reference with every
//! component that submits vector writes; there is no process-wide static.
//!
//! Uses parking_lot::Mutex; the lock is never held across an await.

use crate::queue::{QueueStats, WriteQueue};
use dualstore_core::{QueueResult, VectorSearchDriver, WriteQueueConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of write queues keyed by collection name
#[derive(Default)]
pub struct QueueRegistry {
    queues: Mutex<HashMap<String, Arc<WriteQueue>>>,
}

impl QueueRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the collection's queue, creating it on first use
    ///
    /// A queue that has been shut down is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a new queue would be created with an
    /// invalid config.
    pub fn get_or_create(
        &self,
        collection: &str,
        driver: &Arc<dyn VectorSearchDriver>,
        config: &WriteQueueConfig,
    ) -> QueueResult<Arc<WriteQueue>> {
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get(collection) {
            if !queue.is_shut_down() {
                return Ok(Arc::clone(queue));
            }
        }
        let queue = Arc::new(WriteQueue::new(
            collection,
            Arc::clone(driver),
            config.clone(),
        )?);
        queues.insert(collection.to_string(), Arc::clone(&queue));
        Ok(queue)
    }

    /// Look up an existing queue
    pub fn get(&self, collection: &str) -> Option<Arc<WriteQueue>> {
        self.queues.lock().get(collection).cloned()
    }

    /// Registered collection names, sorted
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered queues
    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    /// Check if no queue is registered
    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }

    /// Stats of every queue, sorted by collection
    pub fn stats(&self) -> Vec<QueueStats> {
        let mut stats: Vec<QueueStats> = self.snapshot().iter().map(|q| q.stats()).collect();
        stats.sort_by(|a, b| a.collection.cmp(&b.collection));
        stats
    }

    /// Force-flush every queue
    pub async fn flush_all(&self) -> QueueResult<()> {
        for queue in self.snapshot() {
            if !queue.is_shut_down() {
                queue.force_flush().await?;
            }
        }
        Ok(())
    }

    /// Shut down and remove every queue
    pub async fn shutdown_all(&self) -> QueueResult<()> {
        let drained: Vec<Arc<WriteQueue>> = self.queues.lock().drain().map(|(_, q)| q).collect();
        let count = drained.len();
        for queue in drained {
            queue.shutdown().await?;
        }
        info!(target: "dualstore::queue", queues = count, "All write queues shut down");
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<WriteQueue>> {
        self.queues.lock().values().cloned().collect()
    }
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("collections", &self.collections())
            .finish()
    }
}
