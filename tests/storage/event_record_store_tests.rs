//! EventRecordStore contract.
//!
//! Profiles are unique per test function so the suite can share one store.

use chrono::{Duration, Utc};
use serde_json::json;

use revreg_coordinator::events::{RecordKey, TransitionError};
use revreg_coordinator::interfaces::{EventRecordStore, StorageError};
use revreg_coordinator::{EventOptions, EventRecord, EventType, RecordState};

pub fn make_record(profile: &str, correlation_id: &str, event_type: EventType) -> EventRecord {
    let now = Utc::now();
    EventRecord::requested(
        profile,
        event_type,
        json!({"cred_def_id": "CD1", "max_cred_num": 100}),
        &EventOptions::new(correlation_id).with_set_active(true),
        now + Duration::seconds(30),
        now,
    )
}

// =============================================================================
// insert / get
// =============================================================================

pub async fn test_insert_and_get<S: EventRecordStore>(store: &S) {
    let record = make_record("test_insert_get", "corr-1", EventType::RevRegDefCreate);
    store.insert(&record).await.expect("insert should succeed");

    let loaded = store
        .get(&record.key())
        .await
        .expect("get should succeed")
        .expect("record should exist");

    assert_eq!(loaded.state, RecordState::Requested);
    assert_eq!(loaded.event_payload, record.event_payload);
    assert_eq!(loaded.options, record.options);
    assert_eq!(loaded.version, record.version);
    assert_eq!(
        loaded.expiry_timestamp.timestamp_micros(),
        record.expiry_timestamp.timestamp_micros()
    );
}

pub async fn test_get_missing<S: EventRecordStore>(store: &S) {
    let key = RecordKey::new("test_get_missing", "nope", EventType::RevListCreate);
    let loaded = store.get(&key).await.expect("get should succeed");
    assert!(loaded.is_none(), "missing key should return None");
}

pub async fn test_insert_duplicate_rejected<S: EventRecordStore>(store: &S) {
    let record = make_record("test_insert_dup", "corr-1", EventType::RevRegDefCreate);
    store.insert(&record).await.expect("first insert should succeed");

    let err = store.insert(&record).await.expect_err("duplicate should fail");
    assert!(
        matches!(err, StorageError::AlreadyExists(_)),
        "expected AlreadyExists, got {err:?}"
    );
}

pub async fn test_same_correlation_different_types<S: EventRecordStore>(store: &S) {
    let profile = "test_same_corr";
    for event_type in EventType::ALL {
        store
            .insert(&make_record(profile, "corr-1", event_type))
            .await
            .expect("insert should succeed");
    }

    let records = store
        .list_by_correlation(profile, "corr-1")
        .await
        .expect("list should succeed");
    assert_eq!(records.len(), EventType::ALL.len());
}

// =============================================================================
// update
// =============================================================================

pub async fn test_update_with_current_version<S: EventRecordStore>(store: &S) {
    let mut record = make_record("test_update_ok", "corr-1", EventType::RevListStore);
    store.insert(&record).await.expect("insert should succeed");

    let expected = record.version;
    record
        .mark_success(json!({"rev_reg_def_id": "R1"}), Utc::now())
        .expect("transition should succeed");
    store
        .update(&record, expected)
        .await
        .expect("update should succeed");

    let loaded = store.get(&record.key()).await.unwrap().unwrap();
    assert_eq!(loaded.state, RecordState::ResponseSuccess);
    assert_eq!(loaded.response_payload, Some(json!({"rev_reg_def_id": "R1"})));
    assert_eq!(loaded.version, expected + 1);
}

pub async fn test_update_with_stale_version<S: EventRecordStore>(store: &S) {
    let mut record = make_record("test_update_stale", "corr-1", EventType::RevListStore);
    store.insert(&record).await.expect("insert should succeed");

    let expected = record.version;
    let mut competing = record.clone();

    record
        .mark_failure("ledger down", true, Utc::now(), Utc::now())
        .expect("transition should succeed");
    store.update(&record, expected).await.expect("first writer wins");

    competing
        .mark_success(json!({}), Utc::now())
        .expect("transition should succeed");
    let err = store
        .update(&competing, expected)
        .await
        .expect_err("stale writer should lose");
    assert!(err.is_conflict(), "expected a conflict, got {err:?}");

    let loaded = store.get(&record.key()).await.unwrap().unwrap();
    assert_eq!(loaded.state, RecordState::ResponseFailure);
    assert_eq!(loaded.should_retry, Some(true));
}

pub async fn test_update_missing<S: EventRecordStore>(store: &S) {
    let record = make_record("test_update_missing", "corr-1", EventType::RevListStore);
    let err = store
        .update(&record, record.version)
        .await
        .expect_err("update of missing record should fail");
    assert!(
        matches!(err, StorageError::NotFound(_)),
        "expected NotFound, got {err:?}"
    );
}

pub async fn test_transition_errors_do_not_touch_store<S: EventRecordStore>(store: &S) {
    let mut record = make_record("test_transition", "corr-1", EventType::RevRegActivation);
    record.mark_success(json!({}), Utc::now()).unwrap();
    store.insert(&record).await.expect("insert should succeed");

    let err: TransitionError = record
        .reset_for_retry(Utc::now(), Utc::now())
        .expect_err("succeeded records cannot be retried");
    assert_eq!(err.state, RecordState::ResponseSuccess);

    let loaded = store.get(&record.key()).await.unwrap().unwrap();
    assert_eq!(loaded.state, RecordState::ResponseSuccess);
}

// =============================================================================
// scans
// =============================================================================

pub async fn test_list_by_states<S: EventRecordStore>(store: &S) {
    let profile = "test_list_states";
    let requested = make_record(profile, "corr-1", EventType::RevRegDefCreate);
    let mut failed = make_record(profile, "corr-2", EventType::RevListCreate);
    failed
        .mark_failure("timeout", true, Utc::now(), Utc::now())
        .unwrap();
    let mut done = make_record(profile, "corr-3", EventType::RevListStore);
    done.mark_success(json!({}), Utc::now()).unwrap();

    for record in [&requested, &failed, &done] {
        store.insert(record).await.expect("insert should succeed");
    }
    store
        .insert(&make_record("test_list_states_other", "corr-1", EventType::RevRegDefCreate))
        .await
        .expect("insert should succeed");

    let mut in_progress = store
        .list_by_states(profile, &[RecordState::Requested, RecordState::ResponseFailure])
        .await
        .expect("list should succeed");
    in_progress.sort_by(|a, b| a.correlation_id.cmp(&b.correlation_id));

    assert_eq!(in_progress.len(), 2);
    assert_eq!(in_progress[0].correlation_id, "corr-1");
    assert_eq!(in_progress[1].correlation_id, "corr-2");
    assert_eq!(in_progress[1].error_message.as_deref(), Some("timeout"));

    let succeeded = store
        .list_by_states(profile, &[RecordState::ResponseSuccess])
        .await
        .expect("list should succeed");
    assert_eq!(succeeded.len(), 1);
}

pub async fn test_list_by_correlation_scoped_to_profile<S: EventRecordStore>(store: &S) {
    store
        .insert(&make_record("test_corr_a", "shared", EventType::RevRegDefCreate))
        .await
        .unwrap();
    store
        .insert(&make_record("test_corr_b", "shared", EventType::RevRegDefCreate))
        .await
        .unwrap();

    let records = store.list_by_correlation("test_corr_a", "shared").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].profile, "test_corr_a");
}

// =============================================================================
// delete
// =============================================================================

pub async fn test_delete<S: EventRecordStore>(store: &S) {
    let record = make_record("test_delete", "corr-1", EventType::RevRegDefStore);
    store.insert(&record).await.unwrap();

    assert!(store.delete(&record.key()).await.expect("delete should succeed"));
    assert!(!store.delete(&record.key()).await.expect("second delete should succeed"));
    assert!(store.get(&record.key()).await.unwrap().is_none());
}

/// Run the full EventRecordStore contract against a store.
#[macro_export]
macro_rules! run_event_record_store_tests {
    ($store:expr) => {
        use $crate::storage::event_record_store_tests::*;

        test_insert_and_get($store).await;
        println!("  test_insert_and_get: PASSED");

        test_get_missing($store).await;
        println!("  test_get_missing: PASSED");

        test_insert_duplicate_rejected($store).await;
        println!("  test_insert_duplicate_rejected: PASSED");

        test_same_correlation_different_types($store).await;
        println!("  test_same_correlation_different_types: PASSED");

        test_update_with_current_version($store).await;
        println!("  test_update_with_current_version: PASSED");

        test_update_with_stale_version($store).await;
        println!("  test_update_with_stale_version: PASSED");

        test_update_missing($store).await;
        println!("  test_update_missing: PASSED");

        test_transition_errors_do_not_touch_store($store).await;
        println!("  test_transition_errors_do_not_touch_store: PASSED");

        test_list_by_states($store).await;
        println!("  test_list_by_states: PASSED");

        test_list_by_correlation_scoped_to_profile($store).await;
        println!("  test_list_by_correlation_scoped_to_profile: PASSED");

        test_delete($store).await;
        println!("  test_delete: PASSED");
    };
}
