//! Step tables for the revocation sagas.
//!
//! Ordering lives here rather than in the step handlers: each handler performs
//! one side effect, and `transition` decides what follows it. Keeping the
//! table pure makes the chains testable without collaborators.
//!
//! Setup chain:
//! `RevRegDefCreate -> RevRegDefStore -> RevListCreate -> RevListStore -> (RevRegActivation)`
//!
//! Full-handling chain:
//! `RevRegFullHandling -> RevRegActivation(backup) -> [nested setup] -> full-handling-completed`

use serde_json::Value;

use crate::events::{
    ActivationRequest, EventOptions, EventType, FullHandlingCompleted, FullHandlingContext,
    RegistrySummary, RevRegDefCreateRequest, Topic,
};

/// Steps of the initial setup chain, in order.
pub const SETUP_CHAIN: [EventType; 4] = [
    EventType::RevRegDefCreate,
    EventType::RevRegDefStore,
    EventType::RevListCreate,
    EventType::RevListStore,
];

/// What happens after a step succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Store and emit the next step under the same correlation id.
    Next(EventType),
    /// Full handling needs a fresh registry: start a nested setup run.
    StartNestedSetup { set_active: bool },
    /// A primary registry is active: create its backup in a separate run.
    StartBackupSetup,
    /// The nested run of a full-handling saga is done.
    CompleteFullHandling,
    /// Terminal.
    Finish,
}

/// Errors mapping a step response onto the next request.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("Malformed {event_type} response: {source}")]
    Response {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },

    #[error("No payload mapping from {from} to {to}")]
    NoMapping { from: EventType, to: EventType },

    #[error("Full-handling context missing from options")]
    MissingContext,

    #[error("Full-handling context names no backup registry")]
    MissingBackup,
}

/// The step table.
pub fn transition(event_type: EventType, options: &EventOptions) -> Transition {
    match event_type {
        EventType::RevRegDefCreate => Transition::Next(EventType::RevRegDefStore),
        EventType::RevRegDefStore => Transition::Next(EventType::RevListCreate),
        EventType::RevListCreate => Transition::Next(EventType::RevListStore),
        EventType::RevListStore if options.set_active => {
            Transition::Next(EventType::RevRegActivation)
        }
        EventType::RevListStore => end_of_setup(options),
        EventType::RevRegActivation => {
            if options.is_nested() {
                Transition::CompleteFullHandling
            } else if options.full_handling.is_some() {
                Transition::StartNestedSetup { set_active: false }
            } else if options.create_backup {
                Transition::StartBackupSetup
            } else {
                Transition::Finish
            }
        }
        EventType::RevRegFullHandling => match &options.full_handling {
            Some(context) if context.backup_rev_reg_def_id.is_some() => {
                Transition::Next(EventType::RevRegActivation)
            }
            _ => Transition::StartNestedSetup { set_active: true },
        },
    }
}

fn end_of_setup(options: &EventOptions) -> Transition {
    if options.is_nested() {
        Transition::CompleteFullHandling
    } else {
        Transition::Finish
    }
}

/// Topics announced after a step's response topic.
pub fn announcements(event_type: EventType) -> &'static [Topic] {
    match event_type {
        EventType::RevListStore => &[Topic::RevListFinished],
        _ => &[],
    }
}

/// Parse a registry summary out of a step response.
pub fn registry_summary(event_type: EventType, response: &Value) -> Result<RegistrySummary, SagaError> {
    serde_json::from_value(response.clone()).map_err(|source| SagaError::Response {
        event_type,
        source,
    })
}

/// Build the request payload of `to` from the success response of `from`.
pub fn next_request(
    from: EventType,
    to: EventType,
    response: &Value,
    options: &EventOptions,
) -> Result<Value, SagaError> {
    match (from, to) {
        // Setup responses are already shaped as the next request.
        (EventType::RevRegDefCreate, EventType::RevRegDefStore)
        | (EventType::RevRegDefStore, EventType::RevListCreate)
        | (EventType::RevListCreate, EventType::RevListStore) => Ok(response.clone()),
        (EventType::RevListStore, EventType::RevRegActivation) => {
            let registry = registry_summary(from, response)?;
            to_value(&ActivationRequest {
                rev_reg_def_id: registry.rev_reg_def_id,
                cred_def_id: registry.cred_def_id,
            })
        }
        (EventType::RevRegFullHandling, EventType::RevRegActivation) => {
            let full = registry_summary(from, response)?;
            let context = options
                .full_handling
                .as_ref()
                .ok_or(SagaError::MissingContext)?;
            let backup = context
                .backup_rev_reg_def_id
                .clone()
                .ok_or(SagaError::MissingBackup)?;
            to_value(&ActivationRequest {
                rev_reg_def_id: backup,
                cred_def_id: full.cred_def_id,
            })
        }
        _ => Err(SagaError::NoMapping { from, to }),
    }
}

fn to_value<T: serde::Serialize>(payload: &T) -> Result<Value, SagaError> {
    serde_json::to_value(payload).map_err(|source| SagaError::Response {
        event_type: EventType::RevRegActivation,
        source,
    })
}

/// Request for a fresh registry modelled on the registry in `response`.
pub fn setup_request(event_type: EventType, response: &Value) -> Result<RevRegDefCreateRequest, SagaError> {
    let registry = registry_summary(event_type, response)?;
    Ok(RevRegDefCreateRequest::new(
        &registry.issuer_id,
        &registry.cred_def_id,
        registry.max_cred_num,
    ))
}

/// Correlation id of the nested setup run spawned by a full-handling saga.
///
/// Derived from the parent so a replayed activation finds the run it already
/// started instead of starting another.
pub fn nested_correlation_id(parent_correlation_id: &str) -> String {
    format!("{parent_correlation_id}.nested")
}

/// Correlation id of the backup run started after a primary activation.
pub fn backup_correlation_id(primary_correlation_id: &str) -> String {
    format!("{primary_correlation_id}.backup")
}

/// Options for the nested setup run of a full-handling saga.
pub fn nested_setup_options(
    parent: &EventOptions,
    set_active: bool,
) -> Result<EventOptions, SagaError> {
    let context = parent
        .full_handling
        .clone()
        .ok_or(SagaError::MissingContext)?;
    Ok(EventOptions::new(nested_correlation_id(&parent.correlation_id))
        .with_parent(parent.correlation_id.clone())
        .with_full_handling(context)
        .with_set_active(set_active))
}

/// Options for the backup run following a primary activation.
pub fn backup_setup_options(primary: &EventOptions) -> EventOptions {
    EventOptions::new(backup_correlation_id(&primary.correlation_id))
}

/// Completion announcement for a full-handling saga.
///
/// `registry` is the registry the nested run produced. With a backup already
/// in place it becomes the new backup; otherwise it was activated directly.
pub fn completion(context: &FullHandlingContext, registry: &RegistrySummary) -> FullHandlingCompleted {
    match &context.backup_rev_reg_def_id {
        Some(backup) => FullHandlingCompleted {
            cred_def_id: registry.cred_def_id.clone(),
            full_rev_reg_def_id: context.full_rev_reg_def_id.clone(),
            active_rev_reg_def_id: backup.clone(),
            backup_rev_reg_def_id: Some(registry.rev_reg_def_id.clone()),
        },
        None => FullHandlingCompleted {
            cred_def_id: registry.cred_def_id.clone(),
            full_rev_reg_def_id: context.full_rev_reg_def_id.clone(),
            active_rev_reg_def_id: registry.rev_reg_def_id.clone(),
            backup_rev_reg_def_id: None,
        },
    }
}
