//! RevocationSetupCoordinator: starts the initial registry setup saga.
//!
//! Drives nothing past the first step. The step handlers chain the rest.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, info};

use super::TriggerError;
use crate::bus::decode_payload;
use crate::events::{
    CredDefFinished, EventOptions, EventType, RevRegDefCreateRequest, RevocationEvent,
};
use crate::interfaces::{BusError, EventBus, EventHandler};
use crate::storage::EventStorageManager;

/// Starts a registry setup run when a credential definition supporting
/// revocation is finished.
#[derive(Clone)]
pub struct RevocationSetupCoordinator {
    manager: Arc<EventStorageManager>,
    bus: Arc<dyn EventBus>,
}

impl RevocationSetupCoordinator {
    pub fn new(manager: Arc<EventStorageManager>, bus: Arc<dyn EventBus>) -> Self {
        Self { manager, bus }
    }

    /// Handle a finished credential definition.
    ///
    /// Returns the new saga's correlation id, or `None` when the definition
    /// does not support revocation.
    pub async fn on_cred_def_finished(
        &self,
        profile: &str,
        cred_def: &CredDefFinished,
    ) -> Result<Option<String>, TriggerError> {
        if !cred_def.support_revocation {
            debug!(cred_def_id = %cred_def.cred_def_id, "Revocation not supported, no registry setup");
            return Ok(None);
        }

        let request = RevRegDefCreateRequest::new(
            &cred_def.issuer_id,
            &cred_def.cred_def_id,
            cred_def.max_cred_num,
        );
        let options = EventOptions::fresh()
            .with_set_active(true)
            .with_create_backup(true);

        self.start_setup(profile, request, options).await.map(Some)
    }

    /// Store and emit the first step of a setup run.
    pub async fn start_setup(
        &self,
        profile: &str,
        request: RevRegDefCreateRequest,
        options: EventOptions,
    ) -> Result<String, TriggerError> {
        let payload = serde_json::to_value(&request)?;
        self.manager
            .store_event_request(profile, EventType::RevRegDefCreate, payload.clone(), &options)
            .await?;

        let correlation_id = options.correlation_id.clone();
        let event = RevocationEvent::new(
            EventType::RevRegDefCreate.request_topic(),
            profile,
            payload,
            options,
        );
        self.bus.publish(Arc::new(event)).await?;

        info!(
            %profile,
            %correlation_id,
            cred_def_id = %request.cred_def_id,
            "Revocation registry setup started"
        );
        Ok(correlation_id)
    }
}

impl EventHandler for RevocationSetupCoordinator {
    fn name(&self) -> &str {
        "revocation-setup"
    }

    fn handle(&self, event: Arc<RevocationEvent>) -> BoxFuture<'static, Result<(), BusError>> {
        let coordinator = self.clone();
        Box::pin(async move {
            let cred_def: CredDefFinished = decode_payload(&event)?;
            if let Err(e) = coordinator
                .on_cred_def_finished(&event.profile, &cred_def)
                .await
            {
                error!(
                    profile = %event.profile,
                    cred_def_id = %cred_def.cred_def_id,
                    error = %e,
                    "Could not start revocation registry setup"
                );
            }
            Ok(())
        })
    }
}
