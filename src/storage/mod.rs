//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::EventRecordStore;

pub mod manager;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use crate::interfaces::event_record_store::{Result, StorageError};
pub use manager::{EventStorageManager, StepOutcome};
pub use memory::InMemoryEventRecordStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventRecordStore;

/// Initialize the event record store based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn EventRecordStore>, Box<dyn std::error::Error + Send + Sync>> {
    info!("Storage: {} at {}", config.storage_type, config.path);

    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(InMemoryEventRecordStore::new())),
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;

            let store = SqliteEventRecordStore::new(pool);
            store.init().await?;

            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
    }
}
