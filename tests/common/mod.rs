//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use async_trait::async_trait;
pub use dualstore::*;
use parking_lot::Mutex;
use std::sync::{Arc, Once};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output to the test writer, filtered by `RUST_LOG`
pub fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Queue settings that flush every job immediately and retry fast
pub fn fast_queue() -> WriteQueueConfig {
    WriteQueueConfig::default()
        .with_batch_size(1)
        .with_flush_interval_ms(50)
        .with_retry_delay_ms(10)
        .with_max_retries(3)
        .with_jitter(false)
}

/// Default config with the fast queue
pub fn fast_config() -> DualStoreConfig {
    DualStoreConfig {
        queue: fast_queue(),
        ..Default::default()
    }
}

// ============================================================================
// CountingVectorDriver
// ============================================================================

/// Wraps a vector driver and records every call made through it
pub struct CountingVectorDriver {
    inner: Arc<dyn VectorSearchDriver>,
    calls: Mutex<Vec<&'static str>>,
    adds: Mutex<Vec<Vec<String>>>,
}

impl CountingVectorDriver {
    pub fn new(inner: Arc<dyn VectorSearchDriver>) -> Arc<Self> {
        Arc::new(CountingVectorDriver {
            inner,
            calls: Mutex::new(Vec::new()),
            adds: Mutex::new(Vec::new()),
        })
    }

    /// Operation names in call order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Ids of every bulk add, one entry per call
    pub fn adds(&self) -> Vec<Vec<String>> {
        self.adds.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn log(&self, op: &'static str) {
        self.calls.lock().push(op);
    }
}

#[async_trait]
impl VectorSearchDriver for CountingVectorDriver {
    fn name(&self) -> &str {
        "counting"
    }

    fn supports_images(&self) -> bool {
        self.inner.supports_images()
    }

    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        metadatas: &[VectorMetadata],
    ) -> DriverResult<()> {
        self.log("add");
        self.adds.lock().push(ids.to_vec());
        self.inner.add(collection, ids, documents, metadatas).await
    }

    async fn query(
        &self,
        collection: &str,
        texts: &[String],
        limit: usize,
        filter: Option<&RecordFilter>,
    ) -> DriverResult<Vec<Vec<VectorMatch>>> {
        self.log("query");
        self.inner.query(collection, texts, limit, filter).await
    }

    async fn get(&self, collection: &str, ids: &[String]) -> DriverResult<Vec<VectorRecord>> {
        self.log("get");
        self.inner.get(collection, ids).await
    }

    async fn retry_vector_write(&self, collection: &str, record: &VectorRecord) -> DriverResult<()> {
        self.log("retry_vector_write");
        self.inner.retry_vector_write(collection, record).await
    }

    async fn cleanup(&self) -> DriverResult<()> {
        self.log("cleanup");
        self.inner.cleanup().await
    }
}

// ============================================================================
// TestStore
// ============================================================================

/// A memory-backed store with handles to its cluster and vector call log
pub struct TestStore {
    pub cluster: Arc<MemoryCluster>,
    pub vector: Arc<CountingVectorDriver>,
    pub store: DualStore,
}

impl TestStore {
    /// Store with the fast default config
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    /// Store with a custom config
    pub fn with_config(config: DualStoreConfig) -> Self {
        init_test_tracing();
        let cluster = MemoryCluster::new();
        let vector = CountingVectorDriver::new(Arc::new(MemoryVectorDriver::new(Arc::clone(
            &cluster,
        ))));
        let store = DualStore::new(
            config,
            Arc::new(MemoryPrimaryDriver::new(Arc::clone(&cluster))),
            vector.clone(),
        )
        .expect("valid config");
        TestStore {
            cluster,
            vector,
            store,
        }
    }

    /// Config with one collection forced to strict consistency
    pub fn strict(collection: &str) -> Self {
        Self::with_config(fast_config().with_collection(
            collection,
            CollectionConfig {
                consistency: Some(ConsistencyLevel::Strict),
                ..Default::default()
            },
        ))
    }
}

impl std::ops::Deref for TestStore {
    type Target = DualStore;

    fn deref(&self) -> &DualStore {
        &self.store
    }
}
