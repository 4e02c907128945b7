//! In-process event bus over a tokio broadcast channel.
//!
//! Every published event goes to a single consumer task, which matches it
//! against the subscriptions and spawns one delivery per matching handler.
//! Publishing never waits for handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::dispatch::{spawn_deliveries, Subscription};
use super::{EventBus, EventHandler, Result, TopicFilter};
use crate::events::RevocationEvent;

/// Events buffered per bus before a slow consumer starts skipping.
const BUFFERED_EVENTS: usize = 1024;

type Subscriptions = Arc<RwLock<Vec<Subscription>>>;

/// Topic-filtered in-process bus.
///
/// Handlers may subscribe before or after `start_consuming`; events published
/// before the consumer starts are dropped.
pub struct ChannelEventBus {
    sender: broadcast::Sender<Arc<RevocationEvent>>,
    subscriptions: Subscriptions,
    started: AtomicBool,
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUFFERED_EVENTS);
        debug!(capacity = BUFFERED_EVENTS, "Channel event bus created");
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            started: AtomicBool::new(false),
        }
    }

    async fn consume(
        mut receiver: broadcast::Receiver<Arc<RevocationEvent>>,
        subscriptions: Subscriptions,
    ) {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Bus consumer fell behind, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let delivered = spawn_deliveries(&subscriptions, &event).await;
            debug!(
                topic = %event.topic,
                correlation_id = %event.options.correlation_id,
                delivered,
                "Event dispatched"
            );
        }
        info!("Channel event bus closed");
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    #[tracing::instrument(
        name = "bus.publish",
        skip_all,
        fields(topic = %event.topic, correlation_id = %event.options.correlation_id)
    )]
    async fn publish(&self, event: Arc<RevocationEvent>) -> Result<()> {
        // A send error only means no consumer is running yet.
        if self.sender.send(event).is_err() {
            debug!("No consumer running, event dropped");
        }
        Ok(())
    }

    async fn subscribe(&self, filter: TopicFilter, handler: Arc<dyn EventHandler>) -> Result<()> {
        let name = handler.name().to_string();
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.push(Subscription { filter, handler });
        info!(handler = %name, subscribers = subscriptions.len(), "Handler subscribed");
        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tokio::spawn(Self::consume(
            self.sender.subscribe(),
            self.subscriptions.clone(),
        ));
        info!("Channel event bus consuming");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
