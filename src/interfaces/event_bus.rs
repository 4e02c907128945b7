//! Event bus interface for async delivery.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::events::{RevocationEvent, Topic};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Handler '{name}' failed: {message}")]
    HandlerFailed { name: String, message: String },

    #[error("Malformed payload on {topic}: {message}")]
    Decode { topic: Topic, message: String },

    #[error("Subscribe not supported for this bus type")]
    SubscribeNotSupported,
}

/// Handler for processing events from the bus.
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Process one event.
    fn handle(&self, event: Arc<RevocationEvent>) -> BoxFuture<'static, Result<()>>;
}

/// Which topics a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// Every topic.
    All,
    /// Only the listed topics.
    Topics(HashSet<Topic>),
}

impl TopicFilter {
    pub fn topics(topics: impl IntoIterator<Item = Topic>) -> Self {
        TopicFilter::Topics(topics.into_iter().collect())
    }

    pub fn matches(&self, topic: Topic) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Topics(topics) => topics.contains(&topic),
        }
    }
}

/// Interface for topic-based publish/subscribe.
///
/// Publishing schedules delivery and returns without waiting for handlers.
///
/// Implementations:
/// - `ChannelEventBus`: in-process tokio broadcast channel
/// - `MockEventBus`: records publishes for assertions
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to every subscriber whose filter matches its topic.
    async fn publish(&self, event: Arc<RevocationEvent>) -> Result<()>;

    /// Register a handler for a set of topics.
    async fn subscribe(&self, filter: TopicFilter, handler: Arc<dyn EventHandler>) -> Result<()>;

    /// Start delivering to subscribed handlers.
    async fn start_consuming(&self) -> Result<()> {
        Ok(())
    }
}
