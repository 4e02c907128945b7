//! RevocationRegistryFullHandler: starts the registry-full saga.

use std::sync::Arc;

use tracing::info;

use super::TriggerError;
use crate::events::{
    EventOptions, EventType, FullHandlingContext, RegistryFull, RevocationEvent,
};
use crate::interfaces::EventBus;
use crate::storage::EventStorageManager;

/// Starts full handling for a registry that ran out of indices.
///
/// The full registry is retired, the backup (if any) activated under the same
/// correlation id, and a nested setup run creates the next registry. Without
/// a backup the nested run's registry is activated directly, and issuance for
/// the credential definition waits until it is.
#[derive(Clone)]
pub struct RevocationRegistryFullHandler {
    manager: Arc<EventStorageManager>,
    bus: Arc<dyn EventBus>,
}

impl RevocationRegistryFullHandler {
    pub fn new(manager: Arc<EventStorageManager>, bus: Arc<dyn EventBus>) -> Self {
        Self { manager, bus }
    }

    /// Store and emit `full-detected`. Returns the saga's correlation id.
    pub async fn on_registry_full(
        &self,
        profile: &str,
        full: &RegistryFull,
    ) -> Result<String, TriggerError> {
        let options = EventOptions::fresh().with_full_handling(FullHandlingContext::from(full));
        let payload = serde_json::to_value(full)?;

        self.manager
            .store_event_request(profile, EventType::RevRegFullHandling, payload.clone(), &options)
            .await?;

        let correlation_id = options.correlation_id.clone();
        let event = RevocationEvent::new(
            EventType::RevRegFullHandling.request_topic(),
            profile,
            payload,
            options,
        );
        self.bus.publish(Arc::new(event)).await?;

        info!(
            %profile,
            %correlation_id,
            full_rev_reg_def_id = %full.full_rev_reg_def_id,
            backup_rev_reg_def_id = ?full.backup_rev_reg_def_id,
            "Registry full handling started"
        );
        Ok(correlation_id)
    }
}
