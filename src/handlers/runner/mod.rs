//! Uniform step execution.
//!
//! For every requested step the runner:
//! 1. ensures the step's record is in `Requested`
//! 2. performs the side effect through the step's handler
//! 3. on success stores the follow-on request, records the response, then
//!    emits the response topic and the follow-on request
//! 4. on failure records it, backs off and retries inline while the error is
//!    transient and attempts remain, then notifies operators
//!
//! The follow-on record is written before the current step leaves
//! `Requested`, so at every point some record of the saga is still in
//! progress and a recovery scan can pick it up.
//!
//! A record already in `ResponseSuccess` is never performed again: the stored
//! response is replayed and the next step is emitted only if it has no record
//! yet. A record in `ResponseFailure` is left alone; only recovery re-arms it.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::StepHandler;
use crate::config::RecoverySettings;
use crate::events::{EventOptions, EventType, RecordState, RevocationEvent, Topic};
use crate::interfaces::{BusError, EventBus, StorageError};
use crate::saga::{self, SagaError, Transition};
use crate::services::notifier::{FailureNotifier, StepFailure};
use crate::storage::{EventStorageManager, StepOutcome};

/// Reasons a step run stopped before the saga could advance.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Saga(#[from] SagaError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Runs step handlers under the uniform step contract.
pub struct StepRunner {
    manager: Arc<EventStorageManager>,
    bus: Arc<dyn EventBus>,
    notifier: Arc<dyn FailureNotifier>,
    recovery: RecoverySettings,
}

impl StepRunner {
    pub fn new(
        manager: Arc<EventStorageManager>,
        bus: Arc<dyn EventBus>,
        notifier: Arc<dyn FailureNotifier>,
        recovery: RecoverySettings,
    ) -> Self {
        Self {
            manager,
            bus,
            notifier,
            recovery,
        }
    }

    pub fn manager(&self) -> &Arc<EventStorageManager> {
        &self.manager
    }

    /// Run one requested step. Never fails: problems are logged.
    #[tracing::instrument(
        name = "step.run",
        skip_all,
        fields(
            profile = %event.profile,
            correlation_id = %event.options.correlation_id,
            event_type = %handler.event_type(),
            recovery = event.options.recovery,
        )
    )]
    pub async fn run(&self, handler: &dyn StepHandler, event: &RevocationEvent) {
        if let Err(e) = self.execute(handler, event).await {
            error!(error = %e, "Step interrupted, record left for recovery");
        }
    }

    /// Run one requested step, reporting why it stopped early.
    pub async fn execute(&self, handler: &dyn StepHandler, event: &RevocationEvent) -> Result<(), RunError> {
        let event_type = handler.event_type();
        let profile = event.profile.as_str();
        let correlation_id = event.correlation_id();
        let mut options = event.options.clone();

        match self
            .manager
            .get_event(profile, correlation_id, event_type)
            .await?
        {
            Some(record) if record.state == RecordState::ResponseSuccess => {
                info!("Step already succeeded, replaying stored response");
                let response = record.response_payload.unwrap_or(Value::Null);
                return self
                    .advance(event_type, profile, &record.options, response, true)
                    .await;
            }
            Some(record) if record.state == RecordState::Requested => {
                options.retry_count = record.retry_count;
            }
            Some(record) => {
                warn!(
                    correlation_id = %record.correlation_id,
                    should_retry = ?record.should_retry,
                    "Step already failed, ignoring redelivery until recovery re-arms it"
                );
                return Ok(());
            }
            None => {
                let record = self
                    .manager
                    .store_event_request(profile, event_type, event.payload.clone(), &options)
                    .await?;
                options.retry_count = record.retry_count;
            }
        }

        let policy = self.manager.policy().clone();
        loop {
            match handler.perform(profile, &event.payload, &options).await {
                Ok(response) => {
                    return self
                        .advance(event_type, profile, &options, response, false)
                        .await;
                }
                Err(err) => {
                    let should_retry = err.should_retry();
                    let record = self
                        .manager
                        .update_event_response(
                            profile,
                            correlation_id,
                            event_type,
                            StepOutcome::failure(err.to_string(), should_retry),
                        )
                        .await?;

                    if should_retry && policy.should_retry_inline(record.retry_count) {
                        let delay = policy.delay(record.retry_count);
                        warn!(
                            error = %err,
                            retry_count = record.retry_count,
                            ?delay,
                            "Step failed, retrying"
                        );
                        tokio::time::sleep(delay).await;

                        let record = self
                            .manager
                            .update_event_for_retry(profile, correlation_id, event_type)
                            .await?;
                        options.retry_count = record.retry_count;
                        continue;
                    }

                    if should_retry {
                        warn!(
                            error = %err,
                            retry_count = record.retry_count,
                            "Inline retries exhausted, step left for recovery"
                        );
                    } else {
                        error!(error = %err, "Step failed permanently");
                    }
                    self.notifier.notify(&StepFailure::from(&record)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Record the step's success and move the saga on.
    ///
    /// Writes happen before any publish: the follow-on request first, then the
    /// full-handling completion, then the step's own success. A failure at any
    /// point leaves a `Requested` record behind for recovery.
    async fn advance(
        &self,
        event_type: EventType,
        profile: &str,
        options: &EventOptions,
        response: Value,
        replay: bool,
    ) -> Result<(), RunError> {
        let transition = saga::transition(event_type, options);

        let next = match next_step(event_type, transition, options, &response)? {
            Some(step) => self.record_next_step(profile, step).await?,
            None => None,
        };
        let completed = match transition {
            Transition::CompleteFullHandling => Some(
                self.record_full_handling_completion(event_type, profile, options, &response)
                    .await?,
            ),
            _ => None,
        };

        if !replay {
            self.manager
                .update_event_response(
                    profile,
                    &options.correlation_id,
                    event_type,
                    StepOutcome::Success(response.clone()),
                )
                .await?;
            info!(retry_count = options.retry_count, "Step succeeded");
        }

        if let Some(topic) = event_type.response_topic() {
            self.publish(topic, profile, response.clone(), options.clone())
                .await?;
        }
        for topic in saga::announcements(event_type) {
            self.publish(*topic, profile, response.clone(), options.clone())
                .await?;
        }
        if let Some(step) = next {
            self.publish(
                step.event_type.request_topic(),
                profile,
                step.payload,
                step.options,
            )
            .await?;
        }

        if let Some((parent, payload)) = completed {
            self.publish(
                Topic::RevRegFullHandlingCompleted,
                profile,
                payload,
                EventOptions::new(parent.as_str()),
            )
            .await?;
            info!(parent_correlation_id = %parent, "Full handling completed");
            self.purge(profile, &options.correlation_id).await?;
            return self.purge(profile, &parent).await;
        }

        match transition {
            Transition::StartBackupSetup => self.purge(profile, &options.correlation_id).await,
            Transition::Finish => {
                info!(correlation_id = %options.correlation_id, "Saga finished");
                self.purge(profile, &options.correlation_id).await
            }
            _ => Ok(()),
        }
    }

    /// Store a follow-on request unless it already has a record.
    ///
    /// Returns the step when it still needs to be emitted. An existing record
    /// belongs to an earlier attempt and is left to recovery.
    async fn record_next_step(&self, profile: &str, step: NextStep) -> Result<Option<NextStep>, RunError> {
        if self
            .manager
            .get_event(profile, &step.options.correlation_id, step.event_type)
            .await?
            .is_some()
        {
            debug!(
                next_event_type = %step.event_type,
                correlation_id = %step.options.correlation_id,
                "Next step already recorded, not re-emitting"
            );
            return Ok(None);
        }

        self.manager
            .store_event_request(profile, step.event_type, step.payload.clone(), &step.options)
            .await?;
        info!(
            next_event_type = %step.event_type,
            next_correlation_id = %step.options.correlation_id,
            "Next step recorded"
        );
        Ok(Some(step))
    }

    /// Store the completion payload on the parent full-handling record.
    ///
    /// Returns the parent correlation id and the payload to announce.
    async fn record_full_handling_completion(
        &self,
        event_type: EventType,
        profile: &str,
        options: &EventOptions,
        response: &Value,
    ) -> Result<(String, Value), RunError> {
        let parent = options
            .parent_correlation_id
            .as_deref()
            .ok_or(SagaError::MissingContext)?;
        let context = options
            .full_handling
            .as_ref()
            .ok_or(SagaError::MissingContext)?;
        let registry = saga::registry_summary(event_type, response)?;
        let completed = saga::completion(context, &registry);
        let payload = serde_json::to_value(&completed)?;

        self.manager
            .amend_event_response(profile, parent, EventType::RevRegFullHandling, payload.clone())
            .await?;
        debug!(
            parent_correlation_id = %parent,
            active = %completed.active_rev_reg_def_id,
            backup = ?completed.backup_rev_reg_def_id,
            "Recorded full-handling completion"
        );
        Ok((parent.to_string(), payload))
    }

    /// Delete a finished saga's records when configured to.
    async fn purge(&self, profile: &str, correlation_id: &str) -> Result<(), RunError> {
        if !self.recovery.purge_completed {
            return Ok(());
        }
        for record in self
            .manager
            .get_events_for_correlation(profile, correlation_id)
            .await?
        {
            self.manager
                .delete_event(profile, correlation_id, record.event_type)
                .await?;
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: Topic,
        profile: &str,
        payload: Value,
        options: EventOptions,
    ) -> Result<(), RunError> {
        let event = RevocationEvent::new(topic, profile, payload, options);
        self.bus.publish(Arc::new(event)).await?;
        Ok(())
    }
}

/// A request issued by the saga once the current step succeeds.
struct NextStep {
    event_type: EventType,
    payload: Value,
    options: EventOptions,
}

fn next_step(
    event_type: EventType,
    transition: Transition,
    options: &EventOptions,
    response: &Value,
) -> Result<Option<NextStep>, RunError> {
    let step = match transition {
        Transition::Next(next) => NextStep {
            event_type: next,
            payload: saga::next_request(event_type, next, response, options)?,
            options: options.for_next_step(),
        },
        Transition::StartNestedSetup { set_active } => NextStep {
            event_type: EventType::RevRegDefCreate,
            payload: serde_json::to_value(saga::setup_request(event_type, response)?)?,
            options: saga::nested_setup_options(options, set_active)?,
        },
        Transition::StartBackupSetup => NextStep {
            event_type: EventType::RevRegDefCreate,
            payload: serde_json::to_value(saga::setup_request(event_type, response)?)?,
            options: saga::backup_setup_options(options),
        },
        Transition::CompleteFullHandling | Transition::Finish => return Ok(None),
    };
    Ok(Some(step))
}
