//! Shared in-memory state behind the memory drivers
//!
//! A [`MemoryCluster`] plays the role of both remote stores. It keeps the
//! primary records and vector records per collection, counts calls, and lets
//! tests inject faults: failing the next N writes, taking the vector store
//! offline, or dropping every open connection.
//!
//! Connections carry the cluster generation they were opened in; dropping
//! connections bumps the generation, so every older connection fails its
//! health probe and every operation issued on it.

use dashmap::DashMap;
use dualstore_core::{DualStoreEntry, VectorRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Failures produced by the in-memory stores
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Operation issued on a closed or dropped connection
    #[error("connection {connection} is closed")]
    ConnectionClosed {
        /// Connection serial
        connection: u64,
    },

    /// Store taken offline
    #[error("{store} store is unavailable")]
    Unavailable {
        /// "primary" or "vector"
        store: &'static str,
    },

    /// Scheduled failure
    #[error("injected {store} write failure")]
    InjectedFault {
        /// "primary" or "vector"
        store: &'static str,
    },

    /// Parallel slices of a bulk add differ in length
    #[error("bulk add received {ids} ids, {documents} documents and {metadatas} metadatas")]
    LengthMismatch {
        /// Ids supplied
        ids: usize,
        /// Documents supplied
        documents: usize,
        /// Metadatas supplied
        metadatas: usize,
    },
}

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// Connections opened
    pub connections_opened: u64,
    /// Connections closed by a client cache
    pub connections_closed: u64,
    /// Primary inserts that reached the store
    pub primary_inserts: u64,
    /// Primary updates that reached the store
    pub primary_updates: u64,
    /// Vector bulk add calls, failed ones included
    pub vector_add_calls: u64,
    /// Records written by successful vector adds
    pub vector_records_written: u64,
}

#[derive(Default)]
struct Counters {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    primary_inserts: AtomicU64,
    primary_updates: AtomicU64,
    vector_add_calls: AtomicU64,
    vector_records_written: AtomicU64,
}

#[derive(Default)]
struct Faults {
    primary_writes: AtomicUsize,
    vector_writes: AtomicUsize,
    vector_offline: AtomicBool,
}

/// Take one scheduled failure if any remain
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory primary and vector stores with fault injection
#[derive(Default)]
pub struct MemoryCluster {
    records: DashMap<String, HashMap<String, DualStoreEntry>>,
    vectors: DashMap<String, HashMap<String, VectorRecord>>,
    generation: AtomicU64,
    next_connection: AtomicU64,
    faults: Faults,
    counters: Counters,
}

impl MemoryCluster {
    /// Create an empty cluster
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Fail the next `n` primary inserts and updates
    pub fn fail_primary_writes(&self, n: usize) {
        self.faults.primary_writes.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` vector bulk adds
    pub fn fail_vector_writes(&self, n: usize) {
        self.faults.vector_writes.store(n, Ordering::SeqCst);
    }

    /// Take the vector store offline or bring it back
    pub fn set_vector_available(&self, available: bool) {
        self.faults.vector_offline.store(!available, Ordering::SeqCst);
    }

    /// Invalidate every open connection
    pub fn drop_connections(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current call counters
    pub fn stats(&self) -> ClusterStats {
        let c = &self.counters;
        ClusterStats {
            connections_opened: c.connections_opened.load(Ordering::Relaxed),
            connections_closed: c.connections_closed.load(Ordering::Relaxed),
            primary_inserts: c.primary_inserts.load(Ordering::Relaxed),
            primary_updates: c.primary_updates.load(Ordering::Relaxed),
            vector_add_calls: c.vector_add_calls.load(Ordering::Relaxed),
            vector_records_written: c.vector_records_written.load(Ordering::Relaxed),
        }
    }

    /// Primary record by id, bypassing drivers and faults
    pub fn primary_record(&self, collection: &str, id: &str) -> Option<DualStoreEntry> {
        self.records.get(collection)?.get(id).cloned()
    }

    /// Vector record by id, bypassing drivers and faults
    pub fn vector_record(&self, collection: &str, id: &str) -> Option<VectorRecord> {
        self.vectors.get(collection)?.get(id).cloned()
    }

    /// Number of primary records in a collection
    pub fn primary_len(&self, collection: &str) -> usize {
        self.records.get(collection).map_or(0, |c| c.len())
    }

    /// Number of vector records in a collection
    pub fn vector_len(&self, collection: &str) -> usize {
        self.vectors.get(collection).map_or(0, |c| c.len())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    pub(crate) fn open(self: &Arc<Self>) -> MemoryConnection {
        self.counters
            .connections_opened
            .fetch_add(1, Ordering::Relaxed);
        MemoryConnection {
            cluster: Arc::clone(self),
            serial: self.next_connection.fetch_add(1, Ordering::Relaxed) + 1,
            generation: self.generation.load(Ordering::SeqCst),
            closed: AtomicBool::new(false),
        }
    }
}

/// A client connection to a [`MemoryCluster`]
pub struct MemoryConnection {
    cluster: Arc<MemoryCluster>,
    serial: u64,
    generation: u64,
    closed: AtomicBool,
}

impl MemoryConnection {
    /// Connection serial, unique per cluster
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Whether the connection can still serve requests
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.generation == self.cluster.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cluster
                .counters
                .connections_closed
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    fn ensure_open(&self) -> Result<&MemoryCluster, MemoryError> {
        if self.is_open() {
            Ok(self.cluster.as_ref())
        } else {
            Err(MemoryError::ConnectionClosed {
                connection: self.serial,
            })
        }
    }

    fn ensure_vector_online(&self) -> Result<&MemoryCluster, MemoryError> {
        let cluster = self.ensure_open()?;
        if cluster.faults.vector_offline.load(Ordering::SeqCst) {
            return Err(MemoryError::Unavailable { store: "vector" });
        }
        Ok(cluster)
    }

    // ------------------------------------------------------------------
    // Primary store
    // ------------------------------------------------------------------

    pub(crate) fn put_record(
        &self,
        collection: &str,
        entry: DualStoreEntry,
    ) -> Result<(), MemoryError> {
        let cluster = self.ensure_open()?;
        if take_one(&cluster.faults.primary_writes) {
            return Err(MemoryError::InjectedFault { store: "primary" });
        }
        cluster
            .records
            .entry(collection.to_string())
            .or_default()
            .insert(entry.id.clone(), entry);
        cluster
            .counters
            .primary_inserts
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn get_record(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<DualStoreEntry>, MemoryError> {
        let cluster = self.ensure_open()?;
        Ok(cluster.primary_record(collection, id))
    }

    pub(crate) fn scan_records(&self, collection: &str) -> Result<Vec<DualStoreEntry>, MemoryError> {
        let cluster = self.ensure_open()?;
        Ok(cluster
            .records
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Apply `f` to the record; returns false if it does not exist
    pub(crate) fn modify_record(
        &self,
        collection: &str,
        id: &str,
        f: impl FnOnce(&mut DualStoreEntry),
    ) -> Result<bool, MemoryError> {
        let cluster = self.ensure_open()?;
        if take_one(&cluster.faults.primary_writes) {
            return Err(MemoryError::InjectedFault { store: "primary" });
        }
        let Some(mut records) = cluster.records.get_mut(collection) else {
            return Ok(false);
        };
        let Some(entry) = records.get_mut(id) else {
            return Ok(false);
        };
        f(entry);
        cluster
            .counters
            .primary_updates
            .fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Vector store
    // ------------------------------------------------------------------

    pub(crate) fn put_vectors(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), MemoryError> {
        let cluster = self.ensure_open()?;
        cluster
            .counters
            .vector_add_calls
            .fetch_add(1, Ordering::Relaxed);
        if cluster.faults.vector_offline.load(Ordering::SeqCst) {
            return Err(MemoryError::Unavailable { store: "vector" });
        }
        if take_one(&cluster.faults.vector_writes) {
            return Err(MemoryError::InjectedFault { store: "vector" });
        }
        let count = records.len() as u64;
        let mut stored = cluster.vectors.entry(collection.to_string()).or_default();
        for record in records {
            stored.insert(record.id.clone(), record);
        }
        cluster
            .counters
            .vector_records_written
            .fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn get_vectors(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<VectorRecord>, MemoryError> {
        let cluster = self.ensure_vector_online()?;
        let Some(stored) = cluster.vectors.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| stored.get(id).cloned()).collect())
    }

    pub(crate) fn scan_vectors(&self, collection: &str) -> Result<Vec<VectorRecord>, MemoryError> {
        let cluster = self.ensure_vector_online()?;
        Ok(cluster
            .vectors
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("serial", &self.serial)
            .field("generation", &self.generation)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualstore_core::{NewEntry, VectorMetadata};

    fn entry(id: &str) -> DualStoreEntry {
        NewEntry::new("text")
            .with_id(id)
            .with_timestamp(1i64)
            .into_entry()
            .unwrap()
    }

    fn vector(id: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            document: "text".to_string(),
            metadata: VectorMetadata::new(),
        }
    }

    #[test]
    fn test_put_and_get_record() {
        let cluster = MemoryCluster::new();
        let conn = cluster.open();
        conn.put_record("c", entry("a")).unwrap();
        assert_eq!(conn.get_record("c", "a").unwrap().unwrap().id, "a");
        assert!(conn.get_record("c", "b").unwrap().is_none());
        assert_eq!(cluster.stats().primary_inserts, 1);
    }

    #[test]
    fn test_dropped_connection_is_rejected() {
        let cluster = MemoryCluster::new();
        let conn = cluster.open();
        cluster.drop_connections();

        assert!(!conn.is_open());
        assert_eq!(
            conn.get_record("c", "a"),
            Err(MemoryError::ConnectionClosed { connection: 1 })
        );
        assert!(cluster.open().is_open());
    }

    #[test]
    fn test_injected_vector_faults_are_consumed() {
        let cluster = MemoryCluster::new();
        let conn = cluster.open();
        cluster.fail_vector_writes(1);

        assert!(conn.put_vectors("c", vec![vector("a")]).is_err());
        assert!(conn.put_vectors("c", vec![vector("a")]).is_ok());
        assert_eq!(cluster.vector_len("c"), 1);
        assert_eq!(cluster.stats().vector_add_calls, 2);
        assert_eq!(cluster.stats().vector_records_written, 1);
    }

    #[test]
    fn test_offline_vector_store() {
        let cluster = MemoryCluster::new();
        let conn = cluster.open();
        cluster.set_vector_available(false);
        assert_eq!(
            conn.put_vectors("c", vec![vector("a")]),
            Err(MemoryError::Unavailable { store: "vector" })
        );
        assert!(conn.get_vectors("c", &["a".to_string()]).is_err());

        cluster.set_vector_available(true);
        assert!(conn.put_vectors("c", vec![vector("a")]).is_ok());
    }

    #[test]
    fn test_modify_missing_record() {
        let cluster = MemoryCluster::new();
        let conn = cluster.open();
        assert!(!conn.modify_record("c", "a", |_| {}).unwrap());
        conn.put_record("c", entry("a")).unwrap();
        assert!(conn
            .modify_record("c", "a", |e| e.text = "changed".into())
            .unwrap());
        assert_eq!(cluster.primary_record("c", "a").unwrap().text, "changed");
    }

    #[test]
    fn test_close_counts_once() {
        let cluster = MemoryCluster::new();
        let conn = cluster.open();
        conn.close();
        conn.close();
        assert!(!conn.is_open());
        assert_eq!(cluster.stats().connections_closed, 1);
    }
}
