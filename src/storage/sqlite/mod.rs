//! SQLite implementations of storage interfaces.

mod event_record_store;

pub use event_record_store::SqliteEventRecordStore;
