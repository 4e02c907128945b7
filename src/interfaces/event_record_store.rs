//! Event record storage interface.

use async_trait::async_trait;

use crate::events::{EventRecord, RecordKey, RecordState, TransitionError};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Event record not found: {0}")]
    NotFound(RecordKey),

    #[error("Event record already exists: {0}")]
    AlreadyExists(RecordKey),

    #[error("Version conflict on {key}: expected {expected}")]
    VersionConflict { key: RecordKey, expected: u64 },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Corrupt record {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Lost a race with a concurrent writer; re-reading and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::VersionConflict { .. } | StorageError::AlreadyExists(_)
        )
    }
}

/// Interface for event record persistence.
///
/// Holds at most one record per (`profile`, `correlation_id`, `event_type`).
/// Writes are guarded by the record's `version` so concurrent updates of the
/// same key are serialized rather than lost.
///
/// # Implementations
///
/// - `InMemoryEventRecordStore`: process-local map, for tests and ephemeral use
/// - `SqliteEventRecordStore`: SQLite storage
#[async_trait]
pub trait EventRecordStore: Send + Sync {
    /// Fetch the current record for a key.
    async fn get(&self, key: &RecordKey) -> Result<Option<EventRecord>>;

    /// Insert a new record. Fails with `AlreadyExists` if the key is taken.
    async fn insert(&self, record: &EventRecord) -> Result<()>;

    /// Replace a record if its stored version still equals `expected_version`.
    ///
    /// Fails with `VersionConflict` when another writer got there first, and
    /// `NotFound` when the record was deleted.
    async fn update(&self, record: &EventRecord, expected_version: u64) -> Result<()>;

    /// All records of a profile in any of the given states.
    async fn list_by_states(&self, profile: &str, states: &[RecordState]) -> Result<Vec<EventRecord>>;

    /// All records of one saga instance.
    async fn list_by_correlation(&self, profile: &str, correlation_id: &str) -> Result<Vec<EventRecord>>;

    /// Remove a record. Returns whether anything was deleted.
    async fn delete(&self, key: &RecordKey) -> Result<bool>;
}
