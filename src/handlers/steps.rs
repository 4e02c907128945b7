//! The six step handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{StepError, StepHandler};
use crate::events::{
    ActivationRequest, EventOptions, EventType, RegistryFull, RegistrySummary,
    RevListCreateRequest, RevListStoreRequest, RevRegDefCreateRequest, RevRegDefStoreRequest,
};
use crate::interfaces::{RegistryLedger, RegistryStorage, TailsServer};
use crate::registry::{RegistryRecord, RegistryState};

fn decode<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, StepError> {
    Ok(serde_json::from_value(payload.clone())?)
}

fn respond<T: serde::Serialize>(response: &T) -> Result<Value, StepError> {
    Ok(serde_json::to_value(response)?)
}

async fn load_registry(
    storage: &dyn RegistryStorage,
    profile: &str,
    rev_reg_def_id: &str,
) -> Result<RegistryRecord, StepError> {
    storage
        .get(profile, rev_reg_def_id)
        .await?
        .ok_or_else(|| StepError::Permanent(format!("Registry {rev_reg_def_id} not in storage")))
}

/// Generate the definition, host its tails file, publish it.
pub struct RevRegDefCreateStep {
    ledger: Arc<dyn RegistryLedger>,
    tails: Arc<dyn TailsServer>,
}

impl RevRegDefCreateStep {
    pub fn new(ledger: Arc<dyn RegistryLedger>, tails: Arc<dyn TailsServer>) -> Self {
        Self { ledger, tails }
    }
}

#[async_trait]
impl StepHandler for RevRegDefCreateStep {
    fn event_type(&self) -> EventType {
        EventType::RevRegDefCreate
    }

    async fn perform(&self, profile: &str, payload: &Value, _options: &EventOptions) -> Result<Value, StepError> {
        let request: RevRegDefCreateRequest = decode(payload)?;
        if request.max_cred_num == 0 {
            return Err(StepError::Permanent("max_cred_num must be positive".to_string()));
        }

        let created = self
            .ledger
            .create_rev_reg_def(
                profile,
                &request.issuer_id,
                &request.cred_def_id,
                &request.tag,
                request.max_cred_num,
            )
            .await?;

        let mut rev_reg_def = created.rev_reg_def;
        rev_reg_def.tails_location = self
            .tails
            .upload(profile, &created.rev_reg_def_id, &created.tails)
            .await?;
        debug!(
            rev_reg_def_id = %created.rev_reg_def_id,
            tails_location = %rev_reg_def.tails_location,
            "Tails file uploaded"
        );

        self.ledger
            .publish_rev_reg_def(profile, &created.rev_reg_def_id, &rev_reg_def)
            .await?;

        respond(&RevRegDefStoreRequest {
            rev_reg_def_id: created.rev_reg_def_id,
            rev_reg_def,
        })
    }
}

/// Keep the published definition in local storage.
pub struct RevRegDefStoreStep {
    storage: Arc<dyn RegistryStorage>,
}

impl RevRegDefStoreStep {
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl StepHandler for RevRegDefStoreStep {
    fn event_type(&self) -> EventType {
        EventType::RevRegDefStore
    }

    async fn perform(&self, profile: &str, payload: &Value, _options: &EventOptions) -> Result<Value, StepError> {
        let request: RevRegDefStoreRequest = decode(payload)?;
        self.storage
            .store(
                profile,
                RegistryRecord::created(&request.rev_reg_def_id, request.rev_reg_def.clone()),
            )
            .await?;

        let next: RevListCreateRequest = request;
        respond(&next)
    }
}

/// Build and publish the initial revocation list.
pub struct RevListCreateStep {
    ledger: Arc<dyn RegistryLedger>,
}

impl RevListCreateStep {
    pub fn new(ledger: Arc<dyn RegistryLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl StepHandler for RevListCreateStep {
    fn event_type(&self) -> EventType {
        EventType::RevListCreate
    }

    async fn perform(&self, profile: &str, payload: &Value, _options: &EventOptions) -> Result<Value, StepError> {
        let request: RevListCreateRequest = decode(payload)?;
        let rev_list = self
            .ledger
            .create_rev_list(profile, &request.rev_reg_def_id, &request.rev_reg_def)
            .await?;
        let published = self.ledger.publish_rev_list(profile, &rev_list).await?;

        respond(&RevListStoreRequest {
            rev_reg_def_id: request.rev_reg_def_id,
            rev_list: published,
        })
    }
}

/// Attach the published list to the stored registry, marking it finished.
pub struct RevListStoreStep {
    storage: Arc<dyn RegistryStorage>,
}

impl RevListStoreStep {
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl StepHandler for RevListStoreStep {
    fn event_type(&self) -> EventType {
        EventType::RevListStore
    }

    async fn perform(&self, profile: &str, payload: &Value, _options: &EventOptions) -> Result<Value, StepError> {
        let request: RevListStoreRequest = decode(payload)?;
        let mut record = load_registry(self.storage.as_ref(), profile, &request.rev_reg_def_id).await?;

        record.rev_list = Some(request.rev_list);
        if record.state == RegistryState::Created {
            record.state = RegistryState::Finished;
        }
        self.storage.store(profile, record.clone()).await?;

        respond(&RegistrySummary::from(&record))
    }
}

/// Make a finished registry the one used for issuance.
pub struct RevRegActivationStep {
    storage: Arc<dyn RegistryStorage>,
}

impl RevRegActivationStep {
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl StepHandler for RevRegActivationStep {
    fn event_type(&self) -> EventType {
        EventType::RevRegActivation
    }

    async fn perform(&self, profile: &str, payload: &Value, _options: &EventOptions) -> Result<Value, StepError> {
        let request: ActivationRequest = decode(payload)?;
        let mut record = load_registry(self.storage.as_ref(), profile, &request.rev_reg_def_id).await?;

        match record.state {
            RegistryState::Finished => {
                record.state = RegistryState::Active;
                self.storage.store(profile, record.clone()).await?;
            }
            RegistryState::Active => {
                debug!(rev_reg_def_id = %record.rev_reg_def_id, "Registry already active");
            }
            RegistryState::Created => {
                return Err(StepError::Permanent(format!(
                    "Registry {} has no revocation list",
                    record.rev_reg_def_id
                )));
            }
            RegistryState::Full => {
                return Err(StepError::Permanent(format!(
                    "Registry {} is full",
                    record.rev_reg_def_id
                )));
            }
        }

        respond(&RegistrySummary::from(&record))
    }
}

/// Retire a registry that has run out of indices.
pub struct RevRegFullHandlingStep {
    storage: Arc<dyn RegistryStorage>,
}

impl RevRegFullHandlingStep {
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl StepHandler for RevRegFullHandlingStep {
    fn event_type(&self) -> EventType {
        EventType::RevRegFullHandling
    }

    async fn perform(&self, profile: &str, payload: &Value, _options: &EventOptions) -> Result<Value, StepError> {
        let request: RegistryFull = decode(payload)?;
        let mut record =
            load_registry(self.storage.as_ref(), profile, &request.full_rev_reg_def_id).await?;

        if record.cred_def_id() != request.cred_def_id {
            return Err(StepError::Permanent(format!(
                "Registry {} belongs to {}, not {}",
                record.rev_reg_def_id,
                record.cred_def_id(),
                request.cred_def_id
            )));
        }

        if record.state != RegistryState::Full {
            record.state = RegistryState::Full;
            self.storage.store(profile, record.clone()).await?;
        }

        respond(&RegistrySummary::from(&record))
    }
}
