//! Revocation registry domain types exchanged with collaborators.

use serde::{Deserialize, Serialize};

/// Default AnonCreds revocation registry type.
pub const CL_ACCUM: &str = "CL_ACCUM";

/// A revocation registry definition as published to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevRegDef {
    pub issuer_id: String,
    pub cred_def_id: String,
    pub registry_type: String,
    pub tag: String,
    pub max_cred_num: u32,
    pub tails_hash: String,
    /// Public URI of the tails file; empty until uploaded.
    #[serde(default)]
    pub tails_location: String,
}

/// Tails file produced alongside a definition, uploaded before publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailsBlob {
    pub hash: String,
    pub bytes: Vec<u8>,
}

/// Locally generated definition awaiting tails hosting and publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRevRegDef {
    pub rev_reg_def_id: String,
    pub rev_reg_def: RevRegDef,
    pub tails: TailsBlob,
}

/// Revocation status list for a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevList {
    pub rev_reg_def_id: String,
    pub issuer_id: String,
    /// One entry per credential index; `true` means revoked.
    pub revocation_list: Vec<bool>,
    pub current_accumulator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Lifecycle of a registry in local secure storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    /// Definition published and stored, no list yet.
    Created,
    /// Revocation list published and stored; usable as a backup.
    Finished,
    /// Current registry for issuance.
    Active,
    /// All indices consumed.
    Full,
}

/// Registry record kept in local secure storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub rev_reg_def_id: String,
    pub state: RegistryState,
    pub rev_reg_def: RevRegDef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev_list: Option<RevList>,
}

impl RegistryRecord {
    pub fn created(rev_reg_def_id: impl Into<String>, rev_reg_def: RevRegDef) -> Self {
        Self {
            rev_reg_def_id: rev_reg_def_id.into(),
            state: RegistryState::Created,
            rev_reg_def,
            rev_list: None,
        }
    }

    pub fn cred_def_id(&self) -> &str {
        &self.rev_reg_def.cred_def_id
    }
}
