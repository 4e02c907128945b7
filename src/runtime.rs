//! Runtime builder: wires storage, bus, collaborators and services.
//!
//! ```ignore
//! let runtime = RuntimeBuilder::new()
//!     .with_config(Config::load(None)?)
//!     .with_ledger(ledger)
//!     .with_tails_server(tails)
//!     .with_registry_storage(storage)
//!     .build()
//!     .await?;
//!
//! runtime.setup().on_cred_def_finished("default", &cred_def).await?;
//! ```

use std::sync::Arc;

use tracing::info;

use crate::bus::ChannelEventBus;
use crate::config::{Config, RecoverySettings};
use crate::handlers::{StepDispatcher, StepRunner, StepTable};
use crate::interfaces::{
    BusError, EventBus, EventRecordStore, RegistryLedger, RegistryStorage, TailsServer, TopicFilter,
};
use crate::events::Topic;
use crate::services::notifier::{FailureNotifier, FanoutNotifier, WebhookError};
use crate::services::{
    AdminRecoveryTrigger, EventRecoveryManager, RecoveredProfiles, RecoveryLayer,
    RevocationRegistryFullHandler, RevocationSetupCoordinator,
};
use crate::storage::{init_storage, EventStorageManager};
use crate::utils::retry::RetryPolicy;

/// Errors building the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Storage initialization failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Notifier(#[from] WebhookError),
}

/// Builder for [`RevocationRuntime`].
///
/// Defaults: configuration from [`Config::default`], the event record store
/// it names, an in-process channel bus, and notifications per its
/// `notifications` section. Ledger, tails host and registry storage have no
/// default and must be supplied.
#[derive(Default)]
pub struct RuntimeBuilder {
    config: Config,
    store: Option<Arc<dyn EventRecordStore>>,
    bus: Option<Arc<dyn EventBus>>,
    notifier: Option<Arc<dyn FailureNotifier>>,
    ledger: Option<Arc<dyn RegistryLedger>>,
    tails: Option<Arc<dyn TailsServer>>,
    registry_storage: Option<Arc<dyn RegistryStorage>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use this store instead of the one the configuration names.
    pub fn with_event_store(mut self, store: Arc<dyn EventRecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this bus instead of an in-process channel bus.
    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn FailureNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn RegistryLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_tails_server(mut self, tails: Arc<dyn TailsServer>) -> Self {
        self.tails = Some(tails);
        self
    }

    pub fn with_registry_storage(mut self, storage: Arc<dyn RegistryStorage>) -> Self {
        self.registry_storage = Some(storage);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the runtime, subscribe its handlers and start consuming.
    pub async fn build(self) -> Result<RevocationRuntime, RuntimeError> {
        let ledger = self.ledger.ok_or(RuntimeError::MissingCollaborator("ledger"))?;
        let tails = self.tails.ok_or(RuntimeError::MissingCollaborator("tails server"))?;
        let registry_storage = self
            .registry_storage
            .ok_or(RuntimeError::MissingCollaborator("registry storage"))?;

        let store = match self.store {
            Some(store) => store,
            None => init_storage(&self.config.storage)
                .await
                .map_err(|e| RuntimeError::Storage(e.to_string()))?,
        };
        let bus: Arc<dyn EventBus> = match self.bus {
            Some(bus) => bus,
            None => Arc::new(ChannelEventBus::new()),
        };
        let notifier: Arc<dyn FailureNotifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(FanoutNotifier::from_config(&self.config.notifications)?),
        };

        let policy = RetryPolicy::from(&self.config.retry);
        let recovery_settings = self.config.recovery.clone();
        let manager = Arc::new(EventStorageManager::new(store, policy.clone()));

        let runner = StepRunner::new(
            manager.clone(),
            bus.clone(),
            notifier,
            recovery_settings.clone(),
        );
        let dispatcher = StepDispatcher::new(
            runner,
            StepTable::new(ledger, tails, registry_storage),
        );
        let setup = RevocationSetupCoordinator::new(manager.clone(), bus.clone());

        bus.subscribe(StepDispatcher::topics(), Arc::new(dispatcher))
            .await?;
        bus.subscribe(
            TopicFilter::topics([Topic::CredDefFinished]),
            Arc::new(setup.clone()),
        )
        .await?;
        bus.start_consuming().await?;

        let full_handler = RevocationRegistryFullHandler::new(manager.clone(), bus.clone());
        let recovery = Arc::new(EventRecoveryManager::new(
            manager.clone(),
            bus.clone(),
            recovery_settings.clone(),
        ));
        let admin_trigger = AdminRecoveryTrigger::new(recovery.clone(), RecoveredProfiles::new());

        info!(
            storage = %self.config.storage.storage_type,
            min_retry = ?policy.min_delay,
            max_retry = ?policy.max_delay,
            recovery_delay = ?policy.recovery_delay,
            max_inline_retries = policy.max_inline_retries,
            "Revocation runtime started"
        );

        Ok(RevocationRuntime {
            config: self.config,
            manager,
            bus,
            setup,
            full_handler,
            recovery,
            admin_trigger,
        })
    }
}

/// A wired coordinator.
pub struct RevocationRuntime {
    config: Config,
    manager: Arc<EventStorageManager>,
    bus: Arc<dyn EventBus>,
    setup: RevocationSetupCoordinator,
    full_handler: RevocationRegistryFullHandler,
    recovery: Arc<EventRecoveryManager>,
    admin_trigger: AdminRecoveryTrigger,
}

impl RevocationRuntime {
    pub fn manager(&self) -> &Arc<EventStorageManager> {
        &self.manager
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn setup(&self) -> &RevocationSetupCoordinator {
        &self.setup
    }

    pub fn full_handler(&self) -> &RevocationRegistryFullHandler {
        &self.full_handler
    }

    pub fn recovery(&self) -> &Arc<EventRecoveryManager> {
        &self.recovery
    }

    pub fn admin_trigger(&self) -> &AdminRecoveryTrigger {
        &self.admin_trigger
    }

    pub fn recovery_settings(&self) -> &RecoverySettings {
        &self.config.recovery
    }

    /// Tower layer running first-request recovery on an admin router.
    pub fn recovery_layer(&self) -> RecoveryLayer {
        RecoveryLayer::new(self.admin_trigger.clone(), &self.config.admin)
    }
}

#[cfg(test)]
mod tests;
