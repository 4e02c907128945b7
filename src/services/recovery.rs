//! EventRecoveryManager: re-emits expired unfinished steps.
//!
//! A record left in `Requested` (crash mid-step) or `ResponseFailure` (inline
//! retries exhausted) becomes eligible once its `expiry_timestamp` passes.
//! Recovery re-arms it and publishes its original request again with
//! `recovery = true`, under the original correlation id.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::RecoverySettings;
use crate::events::{EventRecord, RecordState, RevocationEvent};
use crate::interfaces::{EventBus, StorageError};
use crate::storage::EventStorageManager;

/// Outcome of one recovery scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records in `Requested` or `ResponseFailure`.
    pub scanned: usize,
    /// Re-emitted with `recovery = true`.
    pub recovered: usize,
    /// Expiry still in the future.
    pub not_expired: usize,
    /// Failed with `should_retry = false`; waiting for an operator.
    pub permanent: usize,
    /// Claimed by a concurrent scan or finished in the meantime.
    pub skipped: usize,
    /// Could not be re-armed or re-emitted; retried on the next scan.
    pub failed: usize,
}

/// Scans a profile's records and re-emits the expired ones.
pub struct EventRecoveryManager {
    manager: Arc<EventStorageManager>,
    bus: Arc<dyn EventBus>,
    settings: RecoverySettings,
}

impl EventRecoveryManager {
    pub fn new(
        manager: Arc<EventStorageManager>,
        bus: Arc<dyn EventBus>,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            manager,
            bus,
            settings,
        }
    }

    /// Re-emit every expired unfinished step of `profile`.
    ///
    /// Safe to call repeatedly and concurrently: each record is re-read and
    /// claimed under its version before it is re-emitted.
    #[tracing::instrument(name = "recovery.scan", skip(self))]
    pub async fn recover_in_progress_events(&self, profile: &str) -> Result<RecoveryReport, StorageError> {
        let records = self.manager.get_in_progress_events(profile).await?;
        let mut report = RecoveryReport {
            scanned: records.len(),
            ..Default::default()
        };
        let now = Utc::now();

        for record in records {
            if record.expiry_timestamp > now {
                report.not_expired += 1;
                continue;
            }
            if !record.is_recoverable_at(now, self.settings.retry_permanent_failures) {
                warn!(
                    correlation_id = %record.correlation_id,
                    event_type = %record.event_type,
                    error_message = ?record.error_message,
                    "Permanent failure needs operator attention, not recovering"
                );
                report.permanent += 1;
                continue;
            }

            match self.recover(&record).await {
                Ok(true) => report.recovered += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    error!(
                        correlation_id = %record.correlation_id,
                        event_type = %record.event_type,
                        error = %e,
                        "Could not recover event"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                recovered = report.recovered,
                not_expired = report.not_expired,
                permanent = report.permanent,
                failed = report.failed,
                "Recovery scan complete"
            );
        }
        Ok(report)
    }

    async fn recover(&self, record: &EventRecord) -> Result<bool, RecoverError> {
        let Some(claimed) = self
            .manager
            .claim_for_recovery(
                &record.profile,
                &record.correlation_id,
                record.event_type,
                self.settings.retry_permanent_failures,
            )
            .await?
        else {
            debug!(
                correlation_id = %record.correlation_id,
                event_type = %record.event_type,
                "Record no longer eligible, skipping"
            );
            return Ok(false);
        };
        debug_assert_eq!(claimed.state, RecordState::Requested);

        let mut options = claimed.options.clone();
        options.recovery = true;
        options.retry_count = claimed.retry_count;
        options.request_id = Some(uuid::Uuid::new_v4().to_string());

        let event = RevocationEvent::new(
            claimed.event_type.request_topic(),
            claimed.profile.as_str(),
            claimed.event_payload.clone(),
            options,
        );
        self.bus.publish(Arc::new(event)).await?;

        info!(
            correlation_id = %claimed.correlation_id,
            event_type = %claimed.event_type,
            retry_count = claimed.retry_count,
            "Re-emitted event for recovery"
        );
        Ok(true)
    }
}

#[derive(Debug, thiserror::Error)]
enum RecoverError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Bus(#[from] crate::interfaces::BusError),
}
