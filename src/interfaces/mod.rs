//! Abstract interfaces for the revocation coordinator.
//!
//! These traits define the contracts for:
//! - Event record storage (saga step persistence)
//! - Event bus (async delivery of step requests and responses)
//! - External collaborators (ledger client, tails host, local registry storage)

pub mod collaborators;
pub mod event_bus;
pub mod event_record_store;

pub use collaborators::{CollaboratorError, RegistryLedger, RegistryStorage, TailsServer};
pub use event_bus::{BusError, EventBus, EventHandler, TopicFilter};
pub use event_record_store::{EventRecordStore, StorageError};
