//! Scripted vector driver for queue tests

use async_trait::async_trait;
use dualstore_core::{
    DriverError, DriverResult, RecordFilter, VectorMatch, VectorMetadata, VectorRecord,
    VectorSearchDriver,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records every bulk call and fails on demand
#[derive(Default)]
pub struct ScriptedVectorDriver {
    calls: Mutex<Vec<Vec<String>>>,
    fail_next: AtomicUsize,
    always_fail: AtomicBool,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedVectorDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn always_fail(&self, on: bool) {
        self.always_fail.store(on, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSearchDriver for ScriptedVectorDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn add(
        &self,
        _collection: &str,
        ids: &[String],
        _documents: &[String],
        _metadatas: &[VectorMetadata],
    ) -> DriverResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().push(ids.to_vec());

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || self.always_fail.load(Ordering::SeqCst) {
            return Err(DriverError::vector("scripted", "add", "vector store unavailable"));
        }
        Ok(())
    }

    async fn query(
        &self,
        _collection: &str,
        texts: &[String],
        _limit: usize,
        _filter: Option<&RecordFilter>,
    ) -> DriverResult<Vec<Vec<VectorMatch>>> {
        Ok(vec![Vec::new(); texts.len()])
    }

    async fn get(&self, _collection: &str, _ids: &[String]) -> DriverResult<Vec<VectorRecord>> {
        Ok(Vec::new())
    }

    async fn cleanup(&self) -> DriverResult<()> {
        Ok(())
    }
}
