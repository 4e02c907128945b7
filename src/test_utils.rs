//! Test utilities and mock implementations.
//!
//! Mock collaborators for exercising sagas without a ledger, a tails host or
//! secure storage. Failures are injected per call as a queue of errors.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::events::RevocationEvent;
use crate::interfaces::collaborators::Result as CollaboratorResult;
use crate::interfaces::{
    BusError, CollaboratorError, EventHandler, RegistryLedger, RegistryStorage, TailsServer,
};
use crate::registry::{CreatedRevRegDef, RegistryRecord, RevList, RevRegDef, TailsBlob};
use crate::services::notifier::{FailureNotifier, StepFailure};

/// Ledger operations, for failure injection and call inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerCall {
    CreateRevRegDef,
    PublishRevRegDef,
    CreateRevList,
    PublishRevList,
}

/// Mock ledger that keeps published objects in memory.
#[derive(Default)]
pub struct MockLedger {
    failures: RwLock<HashMap<LedgerCall, VecDeque<CollaboratorError>>>,
    calls: RwLock<Vec<(LedgerCall, Instant)>>,
    published_defs: RwLock<HashMap<String, RevRegDef>>,
    published_lists: RwLock<HashMap<String, RevList>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next calls of `call`, one error per call.
    pub async fn fail_next(&self, call: LedgerCall, errors: impl IntoIterator<Item = CollaboratorError>) {
        self.failures
            .write()
            .await
            .entry(call)
            .or_default()
            .extend(errors);
    }

    /// When each attempt of `call` happened.
    pub async fn call_times(&self, call: LedgerCall) -> Vec<Instant> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|(c, _)| *c == call)
            .map(|(_, at)| *at)
            .collect()
    }

    pub async fn call_count(&self, call: LedgerCall) -> usize {
        self.call_times(call).await.len()
    }

    pub async fn published_defs(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.published_defs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn published_list(&self, rev_reg_def_id: &str) -> Option<RevList> {
        self.published_lists.read().await.get(rev_reg_def_id).cloned()
    }

    async fn attempt(&self, call: LedgerCall) -> CollaboratorResult<()> {
        self.calls.write().await.push((call, Instant::now()));
        match self
            .failures
            .write()
            .await
            .get_mut(&call)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RegistryLedger for MockLedger {
    async fn create_rev_reg_def(
        &self,
        _profile: &str,
        issuer_id: &str,
        cred_def_id: &str,
        tag: &str,
        max_cred_num: u32,
    ) -> CollaboratorResult<CreatedRevRegDef> {
        self.attempt(LedgerCall::CreateRevRegDef).await?;
        let rev_reg_def_id = format!("{issuer_id}:4:{cred_def_id}:CL_ACCUM:{tag}");
        Ok(CreatedRevRegDef {
            rev_reg_def: RevRegDef {
                issuer_id: issuer_id.to_string(),
                cred_def_id: cred_def_id.to_string(),
                registry_type: crate::registry::CL_ACCUM.to_string(),
                tag: tag.to_string(),
                max_cred_num,
                tails_hash: format!("hash-{tag}"),
                tails_location: String::new(),
            },
            tails: TailsBlob {
                hash: format!("hash-{tag}"),
                bytes: vec![0u8; 16],
            },
            rev_reg_def_id,
        })
    }

    async fn publish_rev_reg_def(
        &self,
        _profile: &str,
        rev_reg_def_id: &str,
        rev_reg_def: &RevRegDef,
    ) -> CollaboratorResult<()> {
        self.attempt(LedgerCall::PublishRevRegDef).await?;
        self.published_defs
            .write()
            .await
            .insert(rev_reg_def_id.to_string(), rev_reg_def.clone());
        Ok(())
    }

    async fn create_rev_list(
        &self,
        _profile: &str,
        rev_reg_def_id: &str,
        rev_reg_def: &RevRegDef,
    ) -> CollaboratorResult<RevList> {
        self.attempt(LedgerCall::CreateRevList).await?;
        if !self.published_defs.read().await.contains_key(rev_reg_def_id) {
            return Err(CollaboratorError::NotFound(rev_reg_def_id.to_string()));
        }
        Ok(RevList {
            rev_reg_def_id: rev_reg_def_id.to_string(),
            issuer_id: rev_reg_def.issuer_id.clone(),
            revocation_list: vec![false; rev_reg_def.max_cred_num as usize],
            current_accumulator: format!("accum-{}", rev_reg_def.tag),
            timestamp: None,
        })
    }

    async fn publish_rev_list(&self, _profile: &str, rev_list: &RevList) -> CollaboratorResult<RevList> {
        self.attempt(LedgerCall::PublishRevList).await?;
        let mut published = rev_list.clone();
        published.timestamp = Some(chrono::Utc::now().timestamp());
        self.published_lists
            .write()
            .await
            .insert(rev_list.rev_reg_def_id.clone(), published.clone());
        Ok(published)
    }
}

/// Mock tails host returning a URI per registry.
#[derive(Default)]
pub struct MockTailsServer {
    failures: RwLock<VecDeque<CollaboratorError>>,
    uploads: RwLock<Vec<String>>,
}

impl MockTailsServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next(&self, errors: impl IntoIterator<Item = CollaboratorError>) {
        self.failures.write().await.extend(errors);
    }

    pub async fn uploads(&self) -> Vec<String> {
        self.uploads.read().await.clone()
    }
}

#[async_trait]
impl TailsServer for MockTailsServer {
    async fn upload(&self, _profile: &str, rev_reg_def_id: &str, _tails: &TailsBlob) -> CollaboratorResult<String> {
        if let Some(err) = self.failures.write().await.pop_front() {
            return Err(err);
        }
        self.uploads.write().await.push(rev_reg_def_id.to_string());
        Ok(format!("https://tails.test/{rev_reg_def_id}"))
    }
}

/// Registry storage kept in a map keyed by profile and registry id.
#[derive(Default)]
pub struct InMemoryRegistryStorage {
    records: RwLock<HashMap<(String, String), RegistryRecord>>,
    failures: RwLock<VecDeque<CollaboratorError>>,
}

impl InMemoryRegistryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next writes, one error per write.
    pub async fn fail_next_store(&self, errors: impl IntoIterator<Item = CollaboratorError>) {
        self.failures.write().await.extend(errors);
    }

    /// Insert a record directly.
    pub async fn put(&self, profile: &str, record: RegistryRecord) {
        self.records
            .write()
            .await
            .insert((profile.to_string(), record.rev_reg_def_id.clone()), record);
    }

    pub async fn records(&self, profile: &str) -> Vec<RegistryRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .iter()
            .filter(|((p, _), _)| p == profile)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| a.rev_reg_def_id.cmp(&b.rev_reg_def_id));
        records
    }
}

#[async_trait]
impl RegistryStorage for InMemoryRegistryStorage {
    async fn store(&self, profile: &str, record: RegistryRecord) -> CollaboratorResult<()> {
        if let Some(err) = self.failures.write().await.pop_front() {
            return Err(err);
        }
        self.put(profile, record).await;
        Ok(())
    }

    async fn get(&self, profile: &str, rev_reg_def_id: &str) -> CollaboratorResult<Option<RegistryRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(profile.to_string(), rev_reg_def_id.to_string()))
            .cloned())
    }
}

/// Bus handler that counts deliveries, optionally failing each one.
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
    fail: bool,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn count(&self) -> Arc<AtomicUsize> {
        self.count.clone()
    }
}

impl Default for CountingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CountingHandler {
    fn name(&self) -> &str {
        "counting"
    }

    fn handle(&self, event: Arc<RevocationEvent>) -> BoxFuture<'static, Result<(), BusError>> {
        let count = self.count.clone();
        let fail = self.fail;
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            if fail {
                return Err(BusError::HandlerFailed {
                    name: "counting".to_string(),
                    message: format!("rejected {}", event.topic),
                });
            }
            Ok(())
        })
    }
}

/// Notifier that keeps every failure it is told about.
#[derive(Default)]
pub struct RecordingNotifier {
    failures: RwLock<Vec<StepFailure>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn failures(&self) -> Vec<StepFailure> {
        self.failures.read().await.clone()
    }
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn notify(&self, failure: &StepFailure) {
        self.failures.write().await.push(failure.clone());
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
