//! Saga step handlers.
//!
//! A `StepHandler` performs exactly one external side effect for one
//! `EventType`. Everything around it (record bookkeeping, response events,
//! advancing the saga, inline retries) is the `StepRunner`'s job, and the
//! `StepDispatcher` routes request topics to the right handler.

use async_trait::async_trait;
use serde_json::Value;

use crate::events::{EventOptions, EventType};
use crate::interfaces::CollaboratorError;

pub mod dispatcher;
pub mod runner;
pub mod steps;

pub use dispatcher::{StepDispatcher, StepTable};
pub use runner::{RunError, StepRunner};
pub use steps::{
    RevListCreateStep, RevListStoreStep, RevRegActivationStep, RevRegDefCreateStep,
    RevRegDefStoreStep, RevRegFullHandlingStep,
};

/// Classified step failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// Connectivity or timeout; another attempt may succeed.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Bad input or rejected request; retrying will not help.
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl StepError {
    pub fn should_retry(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }
}

impl From<CollaboratorError> for StepError {
    fn from(err: CollaboratorError) -> Self {
        if err.is_transient() {
            StepError::Transient(err.to_string())
        } else {
            StepError::Permanent(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        StepError::Permanent(format!("Malformed payload: {err}"))
    }
}

/// One saga step's side effect.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step this handler performs.
    fn event_type(&self) -> EventType;

    /// Perform the side effect and return the success response.
    async fn perform(
        &self,
        profile: &str,
        payload: &Value,
        options: &EventOptions,
    ) -> Result<Value, StepError>;
}
