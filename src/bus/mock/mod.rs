//! Event bus that records publishes instead of delivering them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, EventBus, EventHandler, Result, TopicFilter};
use crate::events::{RevocationEvent, Topic};

/// Mock event bus that records every publish.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<RevocationEvent>>,
    fail_on_publish: RwLock<bool>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<RevocationEvent> {
        self.published.read().await.clone()
    }

    /// Topics in publish order.
    pub async fn published_topics(&self) -> Vec<Topic> {
        self.published.read().await.iter().map(|e| e.topic).collect()
    }

    /// Events published on one topic, in publish order.
    pub async fn published_on(&self, topic: Topic) -> Vec<RevocationEvent> {
        self.published
            .read()
            .await
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn take_published(&self) -> Vec<RevocationEvent> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, event: Arc<RevocationEvent>) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("simulated publish failure".to_string()));
        }
        self.published.write().await.push((*event).clone());
        Ok(())
    }

    async fn subscribe(&self, _filter: TopicFilter, _handler: Arc<dyn EventHandler>) -> Result<()> {
        Err(BusError::SubscribeNotSupported)
    }
}
