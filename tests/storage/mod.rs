//! Shared event record store contract tests.
//!
//! Each store implementation runs the same suite through
//! `run_event_record_store_tests!`.

pub mod event_record_store_tests;
