//! Consistency Tests
//!
//! Status recording, drift reports and repair across both stores.

use crate::common::*;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Eventual consistency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn eventual_insert_is_visible_while_vector_store_is_down() {
    let t = TestStore::new();
    t.cluster.set_vector_available(false);

    let outcome = t
        .insert("memories", NewEntry::new("booked flights").with_id("m1"))
        .await
        .unwrap();

    assert!(matches!(outcome.vector, VectorWriteOutcome::Failed(_)));
    assert!(t.get("memories", "m1").await.unwrap().is_some());

    let status = t.check_consistency("memories", "m1").await.unwrap();
    assert!(status.has_document);
    assert_eq!(status.vector_write_success, Some(false));
    assert!(status.vector_write_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn successful_insert_records_write_time() {
    let t = TestStore::new();
    let before = now_millis();

    t.insert("memories", NewEntry::new("hello").with_id("m1"))
        .await
        .unwrap();

    let status = t.check_consistency("memories", "m1").await.unwrap();
    assert_eq!(status.state(), ConsistencyState::Consistent);
    assert!(status.vector_write_timestamp.unwrap() >= before);
    assert!(status.vector_write_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn vector_metadata_is_primitive_only() {
    let t = TestStore::new();
    t.insert(
        "memories",
        NewEntry::new("trip notes")
            .with_id("m1")
            .with_timestamp(1_700_000_000_000i64)
            .with_metadata("tags", json!(["travel", "work"]))
            .with_metadata("rating", 4)
            .with_metadata("vectorWriteSuccess", true),
    )
    .await
    .unwrap();

    let record = t.cluster.vector_record("memories", "m1").unwrap();
    assert_eq!(
        record.metadata.get("tags"),
        Some(&MetadataValue::String(r#"["travel","work"]"#.to_string()))
    );
    assert_eq!(record.metadata.get("rating"), Some(&MetadataValue::Number(4.0)));
    assert_eq!(record.metadata.get("type").and_then(|v| v.as_str()), Some("text"));
    assert!(!record.metadata.contains_key("vectorWriteSuccess"));

    let hits = t
        .search("memories", "trip", 5, Some(&RecordFilter::new().eq("rating", 4i64)))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn legacy_date_time_metadata_sets_timestamp() {
    let t = TestStore::new();
    let outcome = t
        .insert(
            "memories",
            NewEntry::new("old import").with_metadata("dateTime", "2024-01-01 00:00:00"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.timestamp, 1_704_067_200_000);
}

#[tokio::test(start_paused = true)]
async fn legacy_bare_date_is_accepted() {
    let t = TestStore::new();
    let outcome = t
        .insert(
            "memories",
            NewEntry::new("old import").with_id("d1").with_metadata("dateTime", "2024-01-02"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.timestamp, 1_704_153_600_000);
    assert!(t.get("memories", "d1").await.unwrap().is_some());
}

// ============================================================================
// Reports and repair
// ============================================================================

#[tokio::test(start_paused = true)]
async fn report_then_repair_heals_drift() {
    let t = TestStore::new();

    t.insert("memories", NewEntry::new("one").with_id("a").with_timestamp(100i64))
        .await
        .unwrap();
    t.cluster.set_vector_available(false);
    t.insert("memories", NewEntry::new("two").with_id("b").with_timestamp(200i64))
        .await
        .unwrap();
    t.insert("memories", NewEntry::new("three").with_id("c").with_timestamp(300i64))
        .await
        .unwrap();

    let report = t.report("memories", ReportScope::all()).await.unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.consistent, 1);
    assert_eq!(report.inconsistent, 2);
    let mut failed: Vec<String> = report.failures.iter().map(|f| f.id.clone()).collect();
    failed.sort();
    assert_eq!(failed, vec!["b", "c"]);

    t.cluster.set_vector_available(true);
    let summary = t.repair("memories", ReportScope::all()).await.unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.repaired.len(), 2);

    let report = t.report("memories", ReportScope::all()).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(t.cluster.vector_len("memories"), 3);
}

#[tokio::test(start_paused = true)]
async fn records_inserted_without_dual_write_stay_out_of_repair() {
    let t = TestStore::new();
    t.insert_with(
        "memories",
        NewEntry::new("private draft").with_id("p1"),
        InsertOptions::default().dual_write(false),
    )
    .await
    .unwrap();

    let status = t.check_consistency("memories", "p1").await.unwrap();
    assert_eq!(status.state(), ConsistencyState::Skipped);

    let report = t.report("memories", ReportScope::all()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.pending, 0);
    assert_eq!(report.missing_vectors, 0);
    assert!(report.is_clean());

    let summary = t.repair("memories", ReportScope::all()).await.unwrap();
    assert!(summary.repaired.is_empty());
    assert_eq!(summary.skipped, 1);
    assert!(t.cluster.vector_record("memories", "p1").is_none());
}

#[tokio::test(start_paused = true)]
async fn report_for_ids_covers_only_listed_records() {
    let t = TestStore::new();
    t.insert("memories", NewEntry::new("one").with_id("a"))
        .await
        .unwrap();
    t.insert("memories", NewEntry::new("two").with_id("b"))
        .await
        .unwrap();

    let report = t
        .report_for_ids("memories", &["b".to_string(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.consistent, 1);
}

#[tokio::test(start_paused = true)]
async fn retry_is_idempotent_after_success() {
    let t = TestStore::new();
    t.cluster.set_vector_available(false);
    t.insert("memories", NewEntry::new("x").with_id("m1"))
        .await
        .unwrap();
    t.cluster.set_vector_available(true);

    assert!(t.retry_vector_write("memories", "m1").await.unwrap());
    let status = t.check_consistency("memories", "m1").await.unwrap();
    let writes = t.cluster.stats().vector_add_calls;

    assert!(t.retry_vector_write("memories", "m1").await.unwrap());
    assert_eq!(t.cluster.stats().vector_add_calls, writes);
    assert_eq!(t.check_consistency("memories", "m1").await.unwrap(), status);
}

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_returns_false_and_records_error() {
    let t = TestStore::new();
    t.cluster.set_vector_available(false);
    t.insert("memories", NewEntry::new("x").with_id("m1"))
        .await
        .unwrap();
    let before = t.cluster.stats().vector_add_calls;

    assert!(!t
        .retry_vector_write_with("memories", "m1", 2)
        .await
        .unwrap());
    assert_eq!(t.cluster.stats().vector_add_calls, before + 2);
    assert_eq!(
        t.vector
            .calls()
            .iter()
            .filter(|op| **op == "retry_vector_write")
            .count(),
        2
    );

    let status = t.check_consistency("memories", "m1").await.unwrap();
    assert_eq!(status.vector_write_success, Some(false));
    assert!(status.vector_write_timestamp.is_none());
}

// ============================================================================
// Properties
// ============================================================================

fn run_paused<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Eventual inserts always land in the primary store; the vector write
    /// succeeds exactly when the injected failures fit in the retry budget.
    #[test]
    fn prop_eventual_insert_always_persists(failures in 0usize..5, max_retries in 1u32..4) {
        let (persisted, written) = run_paused(async move {
            let t = TestStore::with_config(DualStoreConfig {
                queue: fast_queue().with_max_retries(max_retries),
                ..Default::default()
            });
            t.cluster.fail_vector_writes(failures);

            let outcome = t
                .insert("memories", NewEntry::new("x").with_id("m1"))
                .await
                .expect("eventual insert never fails on vector errors");
            let persisted = t.get("memories", "m1").await.unwrap().is_some();
            (persisted, outcome.vector == VectorWriteOutcome::Written)
        });

        prop_assert!(persisted);
        prop_assert_eq!(written, failures < max_retries as usize);
    }
}
