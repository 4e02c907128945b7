//! Revocation registry lifecycle coordinator.
//!
//! Drives AnonCreds revocation registries from creation to activation, and
//! replaces them when full, as event-sourced sagas: every step is persisted
//! as an `EventRecord` before and after its side effect, so interrupted
//! workflows can be found and re-emitted by recovery.

pub mod bus;
pub mod config;
pub mod events;
pub mod handlers;
pub mod interfaces;
pub mod registry;
pub mod runtime;
pub mod saga;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::Config;
pub use events::{EventOptions, EventRecord, EventType, RecordState, RevocationEvent, Topic};
pub use runtime::{RevocationRuntime, RuntimeBuilder, RuntimeError};
pub use utils::retry::RetryPolicy;
