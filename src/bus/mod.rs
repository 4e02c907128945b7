//! Event bus for async delivery.
//!
//! This module contains:
//! - `ChannelEventBus`: in-process topic bus on a tokio broadcast channel
//! - `MockEventBus`: records publishes for assertions
//! - dispatch helpers shared by bus implementations
//!
//! The `EventBus` and `EventHandler` traits live in `crate::interfaces`.

pub mod channel;
pub mod dispatch;
pub mod mock;

pub use crate::interfaces::event_bus::{
    BusError, EventBus, EventHandler, Result, TopicFilter,
};
pub use channel::ChannelEventBus;
pub use dispatch::{decode_payload, Subscription};
pub use mock::MockEventBus;
