//! External collaborator interfaces.
//!
//! The coordinator performs every side effect through these traits. Each
//! implementation owns its own timeouts; a timeout surfaces as an ordinary
//! `CollaboratorError`.

use async_trait::async_trait;

use crate::registry::{CreatedRevRegDef, RegistryRecord, RevList, RevRegDef, TailsBlob};

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, CollaboratorError>;

/// Errors reported by external collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    /// Connectivity problems may clear up; bad input will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Timeout(_)
                | CollaboratorError::Connection(_)
                | CollaboratorError::Unavailable(_)
        )
    }
}

/// Ledger client for revocation objects.
#[async_trait]
pub trait RegistryLedger: Send + Sync {
    /// Generate a registry definition and its tails file for a credential definition.
    async fn create_rev_reg_def(
        &self,
        profile: &str,
        issuer_id: &str,
        cred_def_id: &str,
        tag: &str,
        max_cred_num: u32,
    ) -> Result<CreatedRevRegDef>;

    /// Publish a definition. Publishing an identical definition twice is a no-op.
    async fn publish_rev_reg_def(
        &self,
        profile: &str,
        rev_reg_def_id: &str,
        rev_reg_def: &RevRegDef,
    ) -> Result<()>;

    /// Build the initial revocation list for a published definition.
    async fn create_rev_list(
        &self,
        profile: &str,
        rev_reg_def_id: &str,
        rev_reg_def: &RevRegDef,
    ) -> Result<RevList>;

    /// Publish a revocation list.
    async fn publish_rev_list(&self, profile: &str, rev_list: &RevList) -> Result<RevList>;
}

/// Tails file host.
#[async_trait]
pub trait TailsServer: Send + Sync {
    /// Upload a tails file, returning its public URI.
    async fn upload(&self, profile: &str, rev_reg_def_id: &str, tails: &TailsBlob) -> Result<String>;
}

/// Local secure storage for registry records.
#[async_trait]
pub trait RegistryStorage: Send + Sync {
    /// Create or replace a registry record.
    async fn store(&self, profile: &str, record: RegistryRecord) -> Result<()>;

    /// Load a registry record.
    async fn get(&self, profile: &str, rev_reg_def_id: &str) -> Result<Option<RegistryRecord>>;
}
