//! Step-specific payloads.
//!
//! Each step's success response is shaped as the next step's request, so the
//! saga table can forward it unchanged along the setup chain.

use serde::{Deserialize, Serialize};

use crate::registry::{RegistryRecord, RevList, RevRegDef, CL_ACCUM};

fn default_registry_type() -> String {
    CL_ACCUM.to_string()
}

/// Domain trigger: a credential definition finished publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredDefFinished {
    pub cred_def_id: String,
    pub issuer_id: String,
    pub schema_id: String,
    pub max_cred_num: u32,
    pub support_revocation: bool,
}

/// Domain trigger: a registry has no free indices left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFull {
    pub cred_def_id: String,
    pub full_rev_reg_def_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_rev_reg_def_id: Option<String>,
}

/// Input of `RevRegDefCreate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevRegDefCreateRequest {
    pub issuer_id: String,
    pub cred_def_id: String,
    pub tag: String,
    pub max_cred_num: u32,
    #[serde(default = "default_registry_type")]
    pub registry_type: String,
}

impl RevRegDefCreateRequest {
    /// Request for a new registry with a unique tag.
    pub fn new(issuer_id: &str, cred_def_id: &str, max_cred_num: u32) -> Self {
        Self {
            issuer_id: issuer_id.to_string(),
            cred_def_id: cred_def_id.to_string(),
            tag: uuid::Uuid::new_v4().simple().to_string(),
            max_cred_num,
            registry_type: default_registry_type(),
        }
    }
}

/// Output of `RevRegDefCreate`, input of `RevRegDefStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevRegDefStoreRequest {
    pub rev_reg_def_id: String,
    pub rev_reg_def: RevRegDef,
}

/// Output of `RevRegDefStore`, input of `RevListCreate`.
pub type RevListCreateRequest = RevRegDefStoreRequest;

/// Output of `RevListCreate`, input of `RevListStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevListStoreRequest {
    pub rev_reg_def_id: String,
    pub rev_list: RevList,
}

/// Registry identity returned by list store, activation and full handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub rev_reg_def_id: String,
    pub cred_def_id: String,
    pub issuer_id: String,
    pub max_cred_num: u32,
}

impl From<&RegistryRecord> for RegistrySummary {
    fn from(record: &RegistryRecord) -> Self {
        Self {
            rev_reg_def_id: record.rev_reg_def_id.clone(),
            cred_def_id: record.rev_reg_def.cred_def_id.clone(),
            issuer_id: record.rev_reg_def.issuer_id.clone(),
            max_cred_num: record.rev_reg_def.max_cred_num,
        }
    }
}

/// Input of `RevRegActivation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub rev_reg_def_id: String,
    pub cred_def_id: String,
}

/// Carried in options through a full-handling run and its nested setup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullHandlingContext {
    pub full_rev_reg_def_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_rev_reg_def_id: Option<String>,
}

impl From<&RegistryFull> for FullHandlingContext {
    fn from(full: &RegistryFull) -> Self {
        Self {
            full_rev_reg_def_id: full.full_rev_reg_def_id.clone(),
            backup_rev_reg_def_id: full.backup_rev_reg_def_id.clone(),
        }
    }
}

/// Payload of `full-handling-completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullHandlingCompleted {
    pub cred_def_id: String,
    pub full_rev_reg_def_id: String,
    /// Registry now used for issuance.
    pub active_rev_reg_def_id: String,
    /// Freshly created backup, absent when the new registry was activated directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_rev_reg_def_id: Option<String>,
}
