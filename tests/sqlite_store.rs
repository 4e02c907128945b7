//! Event record store integration tests.
//!
//! Run with: cargo test --test sqlite_store --features sqlite
//!
//! Uses a temporary database file, no external dependencies required.

mod storage;

use std::sync::Arc;

use revreg_coordinator::config::StorageConfig;
use revreg_coordinator::storage::{
    init_storage, EventStorageManager, InMemoryEventRecordStore, SqliteEventRecordStore,
};
use revreg_coordinator::{EventOptions, EventType, RecordState, RetryPolicy};

async fn connect(dir: &tempfile::TempDir) -> SqliteEventRecordStore {
    let path = dir.path().join("records.db");
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .expect("Failed to connect to SQLite");

    let store = SqliteEventRecordStore::new(pool);
    store.init().await.expect("Failed to create schema");
    store
}

#[tokio::test]
async fn test_sqlite_event_record_store() {
    println!("=== SQLite EventRecordStore Tests ===");

    let dir = tempfile::tempdir().unwrap();
    let store = connect(&dir).await;
    run_event_record_store_tests!(&store);

    println!("=== All SQLite EventRecordStore tests PASSED ===");
}

#[tokio::test]
async fn test_memory_event_record_store() {
    println!("=== In-memory EventRecordStore Tests ===");

    let store = InMemoryEventRecordStore::new();
    run_event_record_store_tests!(&store);

    println!("=== All in-memory EventRecordStore tests PASSED ===");
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = connect(&dir).await;
    store.init().await.expect("second init should succeed");
}

#[tokio::test]
async fn test_records_survive_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        path: dir
            .path()
            .join("nested/records.db")
            .to_string_lossy()
            .into_owned(),
        ..Default::default()
    };

    {
        let store = init_storage(&config).await.expect("init should succeed");
        let manager = EventStorageManager::new(store, RetryPolicy::default());
        manager
            .store_event_request(
                "default",
                EventType::RevListCreate,
                serde_json::json!({"rev_reg_def_id": "R1"}),
                &EventOptions::new("corr-1"),
            )
            .await
            .unwrap();
    }

    let store = init_storage(&config).await.expect("reopen should succeed");
    let manager = EventStorageManager::new(store, RetryPolicy::default());
    let in_progress = manager.get_in_progress_events("default").await.unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].state, RecordState::Requested);
    assert_eq!(in_progress[0].correlation_id, "corr-1");
}

#[tokio::test]
async fn test_concurrent_claims_reemit_once() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<SqliteEventRecordStore> = Arc::new(connect(&dir).await);
    // Seeded already expired; a claim pushes the expiry 30s out.
    let seeding = EventStorageManager::new(
        store.clone(),
        RetryPolicy {
            recovery_delay: std::time::Duration::ZERO,
            ..Default::default()
        },
    );
    let manager = Arc::new(EventStorageManager::new(store, RetryPolicy::default()));
    seeding
        .store_event_request(
            "default",
            EventType::RevRegDefStore,
            serde_json::json!({}),
            &EventOptions::new("corr-1"),
        )
        .await
        .unwrap();

    let claims = futures::future::join_all((0..4).map(|_| {
        let manager = manager.clone();
        async move {
            manager
                .claim_for_recovery("default", "corr-1", EventType::RevRegDefStore, false)
                .await
                .unwrap()
        }
    }))
    .await;

    assert_eq!(claims.iter().filter(|c| c.is_some()).count(), 1);
}
