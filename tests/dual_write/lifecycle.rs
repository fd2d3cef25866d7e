//! Lifecycle Tests
//!
//! Connection recovery, teardown and file-based configuration.

use crate::common::*;
use std::sync::Arc;

// ============================================================================
// Connections
// ============================================================================

#[tokio::test(start_paused = true)]
async fn dropped_connections_heal_transparently() {
    let t = TestStore::new();
    t.insert("memories", NewEntry::new("before").with_id("a"))
        .await
        .unwrap();
    let opened = t.cluster.stats().connections_opened;

    t.cluster.drop_connections();

    let outcome = t
        .insert("memories", NewEntry::new("after").with_id("b"))
        .await
        .unwrap();
    assert_eq!(outcome.vector, VectorWriteOutcome::Written);
    assert!(t.cluster.stats().connections_opened > opened);
    assert!(t.cluster.vector_record("memories", "b").is_some());
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cleanup_flushes_pending_writes() {
    let t = TestStore::with_config(DualStoreConfig {
        queue: fast_queue().with_batch_size(50).with_flush_interval_ms(60_000),
        ..Default::default()
    });
    let store = Arc::new(t);

    let inserting = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .insert("memories", NewEntry::new("pending").with_id("p1"))
                .await
        })
    };
    while store
        .queue_stats()
        .first()
        .map_or(true, |s| s.queue_length == 0)
    {
        tokio::task::yield_now().await;
    }

    store.cleanup().await.unwrap();
    let outcome = inserting.await.unwrap().unwrap();

    assert_eq!(outcome.vector, VectorWriteOutcome::Written);
    assert!(store.cluster.vector_record("memories", "p1").is_some());
    assert!(store.queue_stats().is_empty());
    assert!(store.vector.calls().contains(&"cleanup"));
}

#[tokio::test(start_paused = true)]
async fn cleanup_twice_is_harmless() {
    let t = TestStore::new();
    t.insert("memories", NewEntry::new("x").with_id("a"))
        .await
        .unwrap();

    t.cleanup().await.unwrap();
    t.cleanup().await.unwrap();
    assert!(t.queue_stats().is_empty());
}

#[tokio::test(start_paused = true)]
async fn queue_stats_track_each_collection() {
    let t = TestStore::new();
    t.insert("b-collection", NewEntry::new("x")).await.unwrap();
    t.insert("a-collection", NewEntry::new("y")).await.unwrap();
    t.insert("a-collection", NewEntry::new("z")).await.unwrap();

    let stats = t.queue_stats();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].collection, "a-collection");
    assert_eq!(stats[0].writes_completed, 2);
    assert_eq!(stats[1].writes_completed, 1);
    assert_eq!(t.metrics().inserts, 3);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test(start_paused = true)]
async fn toml_config_applies_collection_overrides() {
    let config = DualStoreConfig::from_toml_str(
        r#"
        consistency = "eventual"

        [queue]
        batch_size = 1
        retry_delay_ms = 10
        jitter = false

        [collections.audit]
        consistency = "strict"

        [collections.scratch]
        dual_write = false
        "#,
    )
    .unwrap();
    let t = TestStore::with_config(config);

    let skipped = t
        .insert("scratch", NewEntry::new("draft").with_id("s1"))
        .await
        .unwrap();
    assert_eq!(
        skipped.vector,
        VectorWriteOutcome::Skipped(SkipReason::DualWriteDisabled)
    );
    assert_eq!(t.cluster.vector_len("scratch"), 0);

    t.cluster.set_vector_available(false);
    let err = t
        .insert("audit", NewEntry::new("entry").with_id("a1"))
        .await
        .unwrap_err();
    assert!(err.is_critical());

    let relaxed = t
        .insert("memories", NewEntry::new("note").with_id("m1"))
        .await
        .unwrap();
    assert!(matches!(relaxed.vector, VectorWriteOutcome::Failed(_)));
}

#[test]
fn environment_overrides_file_settings() {
    let mut config = DualStoreConfig::from_toml_str("consistency = \"eventual\"\n").unwrap();
    config
        .apply_env_overrides(|key| match key {
            "DUALSTORE_CONSISTENCY" => Some("strict".to_string()),
            "DUALSTORE_DUAL_WRITE" => Some("off".to_string()),
            _ => None,
        })
        .unwrap();

    let settings = config.resolve("anything");
    assert_eq!(settings.consistency, ConsistencyLevel::Strict);
    assert!(!settings.dual_write);
}

#[test]
fn config_file_in_directory_is_discovered() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "dual_write = false\n[queue]\nmax_retries = 5\n",
    )
    .unwrap();

    let config = DualStoreConfig::from_file(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
    assert!(!config.dual_write);
    assert_eq!(config.queue.max_retries, 5);
}
