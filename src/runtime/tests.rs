use super::*;
use crate::events::{
    CredDefFinished, EventOptions, EventType, FullHandlingCompleted, RecordState, RegistryFull,
    RevRegDefCreateRequest, RevocationEvent,
};
use crate::interfaces::{CollaboratorError, EventHandler};
use crate::registry::{RegistryRecord, RegistryState, RevList, RevRegDef};
use crate::storage::InMemoryEventRecordStore;
use crate::test_utils::{
    InMemoryRegistryStorage, LedgerCall, MockLedger, MockTailsServer, RecordingNotifier,
};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;

/// Collects events of the topics it is subscribed to.
#[derive(Clone, Default)]
struct Recorder {
    events: Arc<RwLock<Vec<RevocationEvent>>>,
}

impl Recorder {
    async fn events(&self) -> Vec<RevocationEvent> {
        self.events.read().await.clone()
    }
}

impl EventHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn handle(&self, event: Arc<RevocationEvent>) -> BoxFuture<'static, Result<(), BusError>> {
        let events = self.events.clone();
        Box::pin(async move {
            events.write().await.push((*event).clone());
            Ok(())
        })
    }
}

struct Fixture {
    runtime: RevocationRuntime,
    ledger: Arc<MockLedger>,
    registries: Arc<InMemoryRegistryStorage>,
    notifier: Arc<RecordingNotifier>,
}

async fn fixture() -> Fixture {
    let ledger = Arc::new(MockLedger::new());
    let registries = Arc::new(InMemoryRegistryStorage::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let runtime = RuntimeBuilder::new()
        .with_config(Config::for_test())
        .with_ledger(ledger.clone())
        .with_tails_server(Arc::new(MockTailsServer::new()))
        .with_registry_storage(registries.clone())
        .with_notifier(notifier.clone())
        .build()
        .await
        .unwrap();
    Fixture {
        runtime,
        ledger,
        registries,
        notifier,
    }
}

async fn eventually<F, Fut>(condition: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..3000 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn cred_def() -> CredDefFinished {
    CredDefFinished {
        cred_def_id: "CD1".to_string(),
        issuer_id: "did:issuer".to_string(),
        schema_id: "S1".to_string(),
        max_cred_num: 100,
        support_revocation: true,
    }
}

fn registry(id: &str, state: RegistryState) -> RegistryRecord {
    RegistryRecord {
        rev_reg_def_id: id.to_string(),
        state,
        rev_reg_def: RevRegDef {
            issuer_id: "did:issuer".to_string(),
            cred_def_id: "CD1".to_string(),
            registry_type: "CL_ACCUM".to_string(),
            tag: id.to_string(),
            max_cred_num: 100,
            tails_hash: "hash".to_string(),
            tails_location: format!("https://tails.test/{id}"),
        },
        rev_list: Some(RevList {
            rev_reg_def_id: id.to_string(),
            issuer_id: "did:issuer".to_string(),
            revocation_list: vec![false; 100],
            current_accumulator: "accum".to_string(),
            timestamp: Some(1),
        }),
    }
}

fn count_in(records: &[RegistryRecord], state: RegistryState) -> usize {
    records.iter().filter(|r| r.state == state).count()
}

async fn setup_done(registries: &InMemoryRegistryStorage) -> bool {
    let records = registries.records("default").await;
    count_in(&records, RegistryState::Active) == 1 && count_in(&records, RegistryState::Finished) == 1
}

async fn subscribe_completions(runtime: &RevocationRuntime) -> Recorder {
    let recorder = Recorder::default();
    runtime
        .bus()
        .subscribe(
            TopicFilter::topics([Topic::RevRegFullHandlingCompleted]),
            Arc::new(recorder.clone()),
        )
        .await
        .unwrap();
    recorder
}

async fn first_completion(recorder: &Recorder) -> FullHandlingCompleted {
    assert!(eventually(|| async { !recorder.events().await.is_empty() }).await);
    serde_json::from_value(recorder.events().await[0].payload.clone()).unwrap()
}

#[tokio::test]
async fn test_setup_activates_registry_and_creates_backup() {
    let f = fixture().await;

    let correlation_id = f
        .runtime
        .setup()
        .on_cred_def_finished("default", &cred_def())
        .await
        .unwrap()
        .unwrap();

    assert!(eventually(|| setup_done(&f.registries)).await);
    assert_eq!(f.ledger.published_defs().await.len(), 2);

    let manager = f.runtime.manager();
    let backup_id = format!("{correlation_id}.backup");
    assert!(
        eventually(|| async {
            manager
                .get_events_for_correlation("default", &backup_id)
                .await
                .unwrap()
                .iter()
                .filter(|r| r.state == RecordState::ResponseSuccess)
                .count()
                == 4
        })
        .await
    );

    let primary = manager
        .get_events_for_correlation("default", &correlation_id)
        .await
        .unwrap();
    assert_eq!(primary.len(), 5);
    assert!(primary.iter().all(|r| r.state == RecordState::ResponseSuccess));
    assert!(f.notifier.failures().await.is_empty());
}

#[tokio::test]
async fn test_cred_def_finished_on_bus_starts_setup() {
    let f = fixture().await;
    let payload = serde_json::to_value(cred_def()).unwrap();

    f.runtime
        .bus()
        .publish(Arc::new(RevocationEvent::new(
            Topic::CredDefFinished,
            "default",
            payload,
            EventOptions::new("cred-def-event"),
        )))
        .await
        .unwrap();

    assert!(eventually(|| setup_done(&f.registries)).await);
}

#[tokio::test(start_paused = true)]
async fn test_transient_ledger_failures_back_off_then_complete() {
    let f = fixture().await;
    f.ledger
        .fail_next(
            LedgerCall::CreateRevList,
            [
                CollaboratorError::Timeout("ledger".to_string()),
                CollaboratorError::Timeout("ledger".to_string()),
            ],
        )
        .await;

    let correlation_id = f
        .runtime
        .setup()
        .on_cred_def_finished("default", &cred_def())
        .await
        .unwrap()
        .unwrap();

    assert!(eventually(|| setup_done(&f.registries)).await);

    let times = f.ledger.call_times(LedgerCall::CreateRevList).await;
    assert!(times.len() >= 3);
    assert_eq!(times[1] - times[0], Duration::from_secs(2));
    assert_eq!(times[2] - times[1], Duration::from_secs(4));

    let record = f
        .runtime
        .manager()
        .get_event("default", &correlation_id, EventType::RevListCreate)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, RecordState::ResponseSuccess);
    assert_eq!(record.retry_count, 2);
}

#[tokio::test]
async fn test_permanent_failure_notifies_and_stops() {
    let f = fixture().await;
    f.ledger
        .fail_next(
            LedgerCall::CreateRevRegDef,
            [CollaboratorError::Invalid("unknown cred def".to_string())],
        )
        .await;

    let correlation_id = f
        .runtime
        .setup()
        .on_cred_def_finished("default", &cred_def())
        .await
        .unwrap()
        .unwrap();

    let notifier = f.notifier.clone();
    assert!(eventually(|| async { notifier.failures().await.len() == 1 }).await);

    let failure = &f.notifier.failures().await[0];
    assert_eq!(failure.correlation_id, correlation_id);
    assert_eq!(failure.event_type, EventType::RevRegDefCreate);
    assert!(!failure.should_retry);
    assert!(f.registries.records("default").await.is_empty());

    // Recovery leaves permanent failures to an operator.
    assert!(f.runtime.admin_trigger().on_admin_request("default").await);
    let record = f
        .runtime
        .manager()
        .get_event("default", &correlation_id, EventType::RevRegDefCreate)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, RecordState::ResponseFailure);
    assert_eq!(record.should_retry, Some(false));
    assert_eq!(f.ledger.call_count(LedgerCall::CreateRevRegDef).await, 1);
}

#[tokio::test]
async fn test_restart_then_admin_request_resumes_saga() {
    let store = Arc::new(InMemoryEventRecordStore::new());
    let ledger = Arc::new(MockLedger::new());
    let registries = Arc::new(InMemoryRegistryStorage::new());
    let mut config = Config::for_test();
    config.retry.min_retry_duration_seconds = 0.0;
    config.retry.max_inline_retries = 0;

    let build = |notifier: Arc<RecordingNotifier>| {
        RuntimeBuilder::new()
            .with_config(config.clone())
            .with_event_store(store.clone())
            .with_ledger(ledger.clone())
            .with_tails_server(Arc::new(MockTailsServer::new()))
            .with_registry_storage(registries.clone())
            .with_notifier(notifier)
            .build()
    };

    // First process: the list step fails and is left for recovery.
    ledger
        .fail_next(
            LedgerCall::CreateRevList,
            [CollaboratorError::Connection("ledger".to_string())],
        )
        .await;
    let notifier = Arc::new(RecordingNotifier::new());
    let first = build(notifier.clone()).await.unwrap();
    let correlation_id = first
        .setup()
        .on_cred_def_finished("default", &cred_def())
        .await
        .unwrap()
        .unwrap();
    assert!(eventually(|| async { notifier.failures().await.len() == 1 }).await);
    drop(first);

    // Second process over the same records.
    let second = build(Arc::new(RecordingNotifier::new())).await.unwrap();
    let recorder = Recorder::default();
    second
        .bus()
        .subscribe(
            TopicFilter::topics([Topic::RevListCreateRequested]),
            Arc::new(recorder.clone()),
        )
        .await
        .unwrap();

    assert!(second.admin_trigger().on_admin_request("default").await);
    assert!(eventually(|| setup_done(&registries)).await);

    let reemitted = recorder.events().await;
    assert!(reemitted[0].options.recovery);
    assert_eq!(reemitted[0].options.correlation_id, correlation_id);

    let records = second
        .manager()
        .get_events_for_correlation("default", &correlation_id)
        .await
        .unwrap();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.state == RecordState::ResponseSuccess));
}

#[tokio::test]
async fn test_admin_request_recovers_interrupted_setup() {
    let f = fixture().await;
    let request = RevRegDefCreateRequest::new("did:issuer", "CD1", 100);
    let options = EventOptions::new("crashed")
        .with_set_active(true)
        .with_create_backup(true);
    f.runtime
        .manager()
        .store_event_request(
            "default",
            EventType::RevRegDefCreate,
            serde_json::to_value(&request).unwrap(),
            &options,
        )
        .await
        .unwrap();

    assert!(f.runtime.admin_trigger().on_admin_request("default").await);
    assert!(eventually(|| setup_done(&f.registries)).await);

    let record = f
        .runtime
        .manager()
        .get_event("default", "crashed", EventType::RevRegDefCreate)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.retry_count, 1);
    assert!(!f.runtime.admin_trigger().on_admin_request("default").await);
}

#[tokio::test]
async fn test_full_registry_with_backup_promotes_backup() {
    let f = fixture().await;
    f.registries.put("default", registry("R1", RegistryState::Active)).await;
    f.registries.put("default", registry("R2", RegistryState::Finished)).await;
    let recorder = subscribe_completions(&f.runtime).await;

    let correlation_id = f
        .runtime
        .full_handler()
        .on_registry_full(
            "default",
            &RegistryFull {
                cred_def_id: "CD1".to_string(),
                full_rev_reg_def_id: "R1".to_string(),
                backup_rev_reg_def_id: Some("R2".to_string()),
            },
        )
        .await
        .unwrap();

    let completed = first_completion(&recorder).await;
    assert_eq!(completed.full_rev_reg_def_id, "R1");
    assert_eq!(completed.active_rev_reg_def_id, "R2");
    let new_backup = completed.backup_rev_reg_def_id.clone().unwrap();
    assert!(new_backup != "R1" && new_backup != "R2");
    assert_eq!(recorder.events().await[0].options.correlation_id, correlation_id);

    let records = f.registries.records("default").await;
    let state_of = |id: &str| records.iter().find(|r| r.rev_reg_def_id == id).map(|r| r.state);
    assert_eq!(state_of("R1"), Some(RegistryState::Full));
    assert_eq!(state_of("R2"), Some(RegistryState::Active));
    assert_eq!(state_of(&new_backup), Some(RegistryState::Finished));

    let parent = f
        .runtime
        .manager()
        .get_event("default", &correlation_id, EventType::RevRegFullHandling)
        .await
        .unwrap()
        .unwrap();
    let recorded: FullHandlingCompleted =
        serde_json::from_value(parent.response_payload.unwrap()).unwrap();
    assert_eq!(recorded, completed);
}

#[tokio::test]
async fn test_full_registry_without_backup_activates_new_registry() {
    let f = fixture().await;
    f.registries.put("default", registry("R1", RegistryState::Active)).await;
    let recorder = subscribe_completions(&f.runtime).await;

    f.runtime
        .full_handler()
        .on_registry_full(
            "default",
            &RegistryFull {
                cred_def_id: "CD1".to_string(),
                full_rev_reg_def_id: "R1".to_string(),
                backup_rev_reg_def_id: None,
            },
        )
        .await
        .unwrap();

    let completed = first_completion(&recorder).await;
    assert!(completed.backup_rev_reg_def_id.is_none());
    assert_ne!(completed.active_rev_reg_def_id, "R1");

    let records = f.registries.records("default").await;
    assert_eq!(count_in(&records, RegistryState::Full), 1);
    assert_eq!(count_in(&records, RegistryState::Active), 1);
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_full_detected_without_context_is_handled() {
    let f = fixture().await;
    f.registries.put("default", registry("R1", RegistryState::Active)).await;
    f.registries.put("default", registry("R2", RegistryState::Finished)).await;
    let recorder = subscribe_completions(&f.runtime).await;

    let full = RegistryFull {
        cred_def_id: "CD1".to_string(),
        full_rev_reg_def_id: "R1".to_string(),
        backup_rev_reg_def_id: Some("R2".to_string()),
    };
    f.runtime
        .bus()
        .publish(Arc::new(RevocationEvent::new(
            Topic::RevRegFullDetected,
            "default",
            serde_json::to_value(&full).unwrap(),
            EventOptions::new("external-full"),
        )))
        .await
        .unwrap();

    let completed = first_completion(&recorder).await;
    assert_eq!(completed.active_rev_reg_def_id, "R2");
}

#[tokio::test]
async fn test_build_requires_collaborators() {
    let result = RuntimeBuilder::new()
        .with_config(Config::for_test())
        .with_tails_server(Arc::new(MockTailsServer::new()))
        .with_registry_storage(Arc::new(InMemoryRegistryStorage::new()))
        .build()
        .await;

    assert!(matches!(result, Err(RuntimeError::MissingCollaborator("ledger"))));
}
