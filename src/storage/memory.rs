//! In-memory EventRecordStore.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{EventRecord, RecordKey, RecordState};
use crate::interfaces::event_record_store::{EventRecordStore, Result, StorageError};

/// Event record store that keeps records in a process-local map.
///
/// Records do not survive a restart. The failure toggles let tests simulate
/// an unavailable backend.
#[derive(Default)]
pub struct InMemoryEventRecordStore {
    records: RwLock<HashMap<RecordKey, EventRecord>>,
    fail_on_write: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl InMemoryEventRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Number of stored records across all profiles.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Every stored record, ordered by creation time.
    pub async fn all(&self) -> Vec<EventRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable("simulated read failure".to_string()));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable("simulated write failure".to_string()));
        }
        Ok(())
    }

    async fn select<F>(&self, filter: F) -> Result<Vec<EventRecord>>
    where
        F: Fn(&EventRecord) -> bool,
    {
        self.check_read().await?;
        let store = self.records.read().await;
        let mut records: Vec<_> = store.values().filter(|r| filter(r)).cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

#[async_trait]
impl EventRecordStore for InMemoryEventRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<EventRecord>> {
        self.check_read().await?;
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn insert(&self, record: &EventRecord) -> Result<()> {
        self.check_write().await?;
        let key = record.key();
        let mut store = self.records.write().await;
        if store.contains_key(&key) {
            return Err(StorageError::AlreadyExists(key));
        }
        store.insert(key, record.clone());
        Ok(())
    }

    async fn update(&self, record: &EventRecord, expected_version: u64) -> Result<()> {
        self.check_write().await?;
        let key = record.key();
        let mut store = self.records.write().await;
        match store.get_mut(&key) {
            None => Err(StorageError::NotFound(key)),
            Some(current) if current.version != expected_version => {
                Err(StorageError::VersionConflict {
                    key,
                    expected: expected_version,
                })
            }
            Some(current) => {
                *current = record.clone();
                Ok(())
            }
        }
    }

    async fn list_by_states(&self, profile: &str, states: &[RecordState]) -> Result<Vec<EventRecord>> {
        self.select(|r| r.profile == profile && states.contains(&r.state))
            .await
    }

    async fn list_by_correlation(&self, profile: &str, correlation_id: &str) -> Result<Vec<EventRecord>> {
        self.select(|r| r.profile == profile && r.correlation_id == correlation_id)
            .await
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool> {
        self.check_write().await?;
        Ok(self.records.write().await.remove(key).is_some())
    }
}
