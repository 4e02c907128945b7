//! EventStorageManager: the only writer of `EventRecord` state.
//!
//! Every operation is a read-modify-write against an `EventRecordStore`,
//! guarded by the record's version. A write that loses a race re-reads and
//! tries again under `storage_conflict_backoff`, so concurrent updates to one
//! (correlation, step) pair serialize instead of overwriting each other's
//! `retry_count` or `expiry_timestamp`.

use std::sync::Arc;

use backon::Retryable;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::events::{EventOptions, EventRecord, EventType, RecordKey, RecordState, TransitionError};
use crate::interfaces::event_record_store::{EventRecordStore, Result, StorageError};
use crate::utils::retry::{storage_conflict_backoff, RetryPolicy};

/// Result of one step attempt, as recorded by `update_event_response`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success(Value),
    Failure {
        error_message: String,
        should_retry: bool,
    },
}

impl StepOutcome {
    pub fn failure(error_message: impl Into<String>, should_retry: bool) -> Self {
        StepOutcome::Failure {
            error_message: error_message.into(),
            should_retry,
        }
    }
}

/// Persistence API for saga step records.
pub struct EventStorageManager {
    store: Arc<dyn EventRecordStore>,
    policy: RetryPolicy,
}

impl EventStorageManager {
    pub fn new(store: Arc<dyn EventRecordStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Create or overwrite the record for (correlation, step) in `Requested`.
    ///
    /// The expiry is `now + recovery_delay`. An existing record is replaced in
    /// place; its `retry_count` never decreases.
    pub async fn store_event_request(
        &self,
        profile: &str,
        event_type: EventType,
        payload: Value,
        options: &EventOptions,
    ) -> Result<EventRecord> {
        let key = RecordKey::new(profile, &options.correlation_id, event_type);

        let attempt = || async {
            let now = Utc::now();
            let expiry = self.policy.request_expiry(now);
            match self.store.get(&key).await? {
                None => {
                    let record =
                        EventRecord::requested(profile, event_type, payload.clone(), options, expiry, now);
                    self.store.insert(&record).await?;
                    Ok::<_, StorageError>(record)
                }
                Some(mut record) => {
                    let expected = record.version;
                    record.rerequest(payload.clone(), options, expiry, now);
                    self.store.update(&record, expected).await?;
                    Ok(record)
                }
            }
        };

        let record = attempt
            .retry(storage_conflict_backoff())
            .when(StorageError::is_conflict)
            .notify(|err, dur| debug!(%key, error = %err, "Record write conflict, retrying in {:?}", dur))
            .await?;

        debug!(
            %key,
            retry_count = record.retry_count,
            expiry = %record.expiry_timestamp,
            "Stored event request"
        );
        Ok(record)
    }

    /// Record the outcome of a step attempt.
    ///
    /// On failure the expiry is `now + recovery_delay + delay(retry_count)`.
    pub async fn update_event_response(
        &self,
        profile: &str,
        correlation_id: &str,
        event_type: EventType,
        outcome: StepOutcome,
    ) -> Result<EventRecord> {
        let key = RecordKey::new(profile, correlation_id, event_type);
        let record = self
            .modify(&key, |record| {
                let now = Utc::now();
                match &outcome {
                    StepOutcome::Success(response) => record.mark_success(response.clone(), now),
                    StepOutcome::Failure {
                        error_message,
                        should_retry,
                    } => {
                        let expiry = self.policy.failure_expiry(now, record.retry_count);
                        record.mark_failure(error_message.clone(), *should_retry, expiry, now)
                    }
                }
            })
            .await?;

        debug!(%key, state = %record.state, "Updated event response");
        Ok(record)
    }

    /// Move a failed (or stalled) record back to `Requested` for another attempt.
    ///
    /// Increments `retry_count` and recomputes the expiry. Rejected once the
    /// step has succeeded.
    pub async fn update_event_for_retry(
        &self,
        profile: &str,
        correlation_id: &str,
        event_type: EventType,
    ) -> Result<EventRecord> {
        let key = RecordKey::new(profile, correlation_id, event_type);
        let record = self
            .modify(&key, |record| {
                let now = Utc::now();
                record.reset_for_retry(self.policy.request_expiry(now), now)
            })
            .await?;

        debug!(%key, retry_count = record.retry_count, "Event reset for retry");
        Ok(record)
    }

    /// `update_event_for_retry` for recovery scans: only if still eligible.
    ///
    /// Re-checks eligibility against the live record inside the versioned
    /// write, so of two overlapping scans only one re-arms a record; the
    /// other sees the fresh expiry and gets `None`.
    pub async fn claim_for_recovery(
        &self,
        profile: &str,
        correlation_id: &str,
        event_type: EventType,
        retry_permanent_failures: bool,
    ) -> Result<Option<EventRecord>> {
        let key = RecordKey::new(profile, correlation_id, event_type);

        let attempt = || async {
            let Some(mut record) = self.store.get(&key).await? else {
                return Ok::<_, StorageError>(None);
            };
            let now = Utc::now();
            if !record.is_recoverable_at(now, retry_permanent_failures) {
                return Ok(None);
            }
            let expected = record.version;
            record.reset_for_retry(self.policy.request_expiry(now), now)?;
            self.store.update(&record, expected).await?;
            Ok(Some(record))
        };

        attempt
            .retry(storage_conflict_backoff())
            .when(StorageError::is_conflict)
            .notify(|err, dur| debug!(%key, error = %err, "Record write conflict, retrying in {:?}", dur))
            .await
    }

    /// Replace the response of a successful record.
    pub async fn amend_event_response(
        &self,
        profile: &str,
        correlation_id: &str,
        event_type: EventType,
        response: Value,
    ) -> Result<EventRecord> {
        let key = RecordKey::new(profile, correlation_id, event_type);
        self.modify(&key, |record| record.amend_response(response.clone(), Utc::now()))
            .await
    }

    /// All records of a profile still owed work (`Requested` or `ResponseFailure`).
    pub async fn get_in_progress_events(&self, profile: &str) -> Result<Vec<EventRecord>> {
        self.store
            .list_by_states(
                profile,
                &[RecordState::Requested, RecordState::ResponseFailure],
            )
            .await
    }

    pub async fn get_event(
        &self,
        profile: &str,
        correlation_id: &str,
        event_type: EventType,
    ) -> Result<Option<EventRecord>> {
        self.store
            .get(&RecordKey::new(profile, correlation_id, event_type))
            .await
    }

    pub async fn get_events_for_correlation(
        &self,
        profile: &str,
        correlation_id: &str,
    ) -> Result<Vec<EventRecord>> {
        self.store.list_by_correlation(profile, correlation_id).await
    }

    /// Remove a record. Cleanup only; nothing depends on it for correctness.
    pub async fn delete_event(
        &self,
        profile: &str,
        correlation_id: &str,
        event_type: EventType,
    ) -> Result<bool> {
        let key = RecordKey::new(profile, correlation_id, event_type);
        let deleted = self.store.delete(&key).await?;
        if deleted {
            info!(%key, "Deleted event record");
        }
        Ok(deleted)
    }

    async fn modify<F>(&self, key: &RecordKey, change: F) -> Result<EventRecord>
    where
        F: Fn(&mut EventRecord) -> std::result::Result<(), TransitionError> + Send + Sync,
    {
        let attempt = || async {
            let mut record = self
                .store
                .get(key)
                .await?
                .ok_or_else(|| StorageError::NotFound(key.clone()))?;
            let expected = record.version;
            change(&mut record)?;
            self.store.update(&record, expected).await?;
            Ok::<_, StorageError>(record)
        };

        attempt
            .retry(storage_conflict_backoff())
            .when(StorageError::is_conflict)
            .notify(|err, dur| debug!(%key, error = %err, "Record write conflict, retrying in {:?}", dur))
            .await
    }
}
