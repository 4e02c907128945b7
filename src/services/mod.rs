//! Saga entry points, recovery and operator hooks.

pub mod admin_trigger;
pub mod full_handler;
pub mod notifier;
pub mod recovery;
pub mod setup;

pub use admin_trigger::{AdminRecoveryTrigger, RecoveredProfiles, RecoveryLayer, RecoveryService};
pub use full_handler::RevocationRegistryFullHandler;
pub use notifier::{FailureNotifier, FanoutNotifier, LogNotifier, StepFailure, WebhookNotifier};
pub use recovery::{EventRecoveryManager, RecoveryReport};
pub use setup::RevocationSetupCoordinator;

use crate::interfaces::{BusError, StorageError};

/// Errors starting a saga from a domain trigger.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
