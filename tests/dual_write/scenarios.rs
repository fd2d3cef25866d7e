//! Reference Scenarios
//!
//! Queue batching, retry and direct writes against a real vector driver,
//! plus strict escalation and repair of unknown ids through the store.

use crate::common::*;
use std::sync::Arc;
use std::time::Duration;

fn record(id: &str) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        document: format!("document {}", id),
        metadata: VectorMetadata::new(),
    }
}

fn counting() -> (Arc<MemoryCluster>, Arc<CountingVectorDriver>) {
    let cluster = MemoryCluster::new();
    let driver = CountingVectorDriver::new(Arc::new(MemoryVectorDriver::new(Arc::clone(&cluster))));
    (cluster, driver)
}

// ============================================================================
// Write Queue
// ============================================================================

#[tokio::test(start_paused = true)]
async fn full_batch_is_one_bulk_call_in_order() {
    let (cluster, driver) = counting();
    let queue = WriteQueue::new(
        "c",
        driver.clone(),
        fast_queue().with_batch_size(3).with_flush_interval_ms(60_000),
    )
    .unwrap();

    let (a, b, c) = tokio::join!(
        queue.enqueue(record("a")),
        queue.enqueue(record("b")),
        queue.enqueue(record("c")),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    assert_eq!(driver.adds(), vec![vec!["a", "b", "c"]]);
    assert_eq!(cluster.vector_len("c"), 3);
    queue.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_batch_retries_without_caller_visible_failure() {
    let (cluster, driver) = counting();
    let queue = WriteQueue::new(
        "c",
        driver.clone(),
        fast_queue().with_batch_size(2).with_max_retries(2),
    )
    .unwrap();
    cluster.fail_vector_writes(1);

    let (a, b) = tokio::join!(queue.enqueue(record("a")), queue.enqueue(record("b")));
    assert!(a.is_ok());
    assert!(b.is_ok());

    let adds = driver.adds();
    assert!(adds.len() >= 2);
    assert_eq!(adds[0], vec!["a", "b"]);
    assert_eq!(cluster.vector_len("c"), 2);
    queue.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn retries_exhausted_surface_to_every_job() {
    let (cluster, driver) = counting();
    let queue = WriteQueue::new(
        "c",
        driver.clone(),
        fast_queue().with_batch_size(2).with_max_retries(2),
    )
    .unwrap();
    cluster.set_vector_available(false);

    let (a, b) = tokio::join!(queue.enqueue(record("a")), queue.enqueue(record("b")));
    for result in [a, b] {
        match result {
            Err(QueueError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }
    assert_eq!(driver.adds().len(), 2);
    queue.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn disabled_queue_writes_synchronously() {
    let (cluster, driver) = counting();
    let queue = WriteQueue::new("c", driver.clone(), WriteQueueConfig::disabled()).unwrap();

    queue.enqueue(record("a")).await.unwrap();

    assert_eq!(driver.adds(), vec![vec!["a"]]);
    assert!(cluster.vector_record("c", "a").is_some());
    assert_eq!(queue.stats().queue_length, 0);
    queue.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn partial_batch_flushes_on_interval() {
    let (_cluster, driver) = counting();
    let queue = WriteQueue::new(
        "c",
        driver.clone(),
        fast_queue().with_batch_size(10).with_flush_interval_ms(200),
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    queue.enqueue(record("a")).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(driver.adds(), vec![vec!["a"]]);
    queue.shutdown().await.unwrap();
}

// ============================================================================
// Coordinator and auditor
// ============================================================================

#[tokio::test(start_paused = true)]
async fn strict_insert_fails_critically_but_record_persists() {
    let t = TestStore::strict("audit");
    t.cluster.set_vector_available(false);

    let err = t
        .insert("audit", NewEntry::new("wire transfer approved").with_id("tx-1"))
        .await
        .unwrap_err();

    assert!(err.is_critical());
    assert!(err.to_string().contains("critical"));

    let stored = t.get("audit", "tx-1").await.unwrap();
    assert!(stored.is_some());
    assert_eq!(
        t.check_consistency("audit", "tx-1").await.unwrap().state(),
        ConsistencyState::Inconsistent
    );
}

#[tokio::test(start_paused = true)]
async fn retry_of_unknown_id_is_not_found_without_vector_calls() {
    let t = TestStore::new();

    let err = t.retry_vector_write("memories", "ghost").await.unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("not found"));
    assert_eq!(t.vector.call_count(), 0);
}
