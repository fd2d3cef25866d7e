//! Primary store driver over a memory cluster

use super::{MemoryClients, MemoryCluster, MemoryConnector, CLIENT_KEY};
use crate::pool::ClientCacheStats;
use async_trait::async_trait;
use dualstore_core::{
    DriverError, DriverKind, DriverResult, DualStoreEntry, EntryUpdate, PrimaryDatabaseDriver,
    RecordFilter, SortOrder,
};
use std::sync::Arc;

const DRIVER_NAME: &str = "memory-primary";

/// `PrimaryDatabaseDriver` backed by a [`MemoryCluster`]
pub struct MemoryPrimaryDriver {
    clients: MemoryClients,
}

impl MemoryPrimaryDriver {
    /// Create a driver for the cluster
    pub fn new(cluster: Arc<MemoryCluster>) -> Self {
        MemoryPrimaryDriver {
            clients: MemoryClients::new(MemoryConnector::new(
                cluster,
                DriverKind::Primary,
                DRIVER_NAME,
            )),
        }
    }

    /// Client cache counters
    pub fn client_stats(&self) -> ClientCacheStats {
        self.clients.stats()
    }

    fn error(operation: &str, source: super::MemoryError) -> DriverError {
        DriverError::primary(DRIVER_NAME, operation, source)
    }
}

#[async_trait]
impl PrimaryDatabaseDriver for MemoryPrimaryDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    async fn insert(&self, collection: &str, entry: &DualStoreEntry) -> DriverResult<()> {
        let conn = self.clients.get(CLIENT_KEY).await?;
        conn.put_record(collection, entry.clone())
            .map_err(|e| Self::error("insert", e).with_document(entry.id.clone()))
    }

    async fn get(&self, collection: &str, id: &str) -> DriverResult<Option<DualStoreEntry>> {
        let conn = self.clients.get(CLIENT_KEY).await?;
        conn.get_record(collection, id)
            .map_err(|e| Self::error("get", e).with_document(id))
    }

    async fn get_most_recent(
        &self,
        collection: &str,
        limit: usize,
        filter: &RecordFilter,
        sort: SortOrder,
    ) -> DriverResult<Vec<DualStoreEntry>> {
        let conn = self.clients.get(CLIENT_KEY).await?;
        let mut entries: Vec<DualStoreEntry> = conn
            .scan_records(collection)
            .map_err(|e| Self::error("get_most_recent", e))?
            .into_iter()
            .filter(|e| filter.matches_entry(e))
            .collect();

        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        if sort == SortOrder::NewestFirst {
            entries.reverse();
        }
        entries.truncate(limit);
        Ok(entries)
    }

    async fn update(&self, collection: &str, id: &str, update: &EntryUpdate) -> DriverResult<bool> {
        let conn = self.clients.get(CLIENT_KEY).await?;
        conn.modify_record(collection, id, |entry| update.apply(entry))
            .map_err(|e| Self::error("update", e).with_document(id))
    }

    async fn cleanup(&self) -> DriverResult<()> {
        self.clients.clear().await;
        Ok(())
    }
}
