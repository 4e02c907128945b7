//! Handler dispatch utilities.
//!
//! Provides common patterns for routing events to registered handlers.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::{BusError, EventHandler, TopicFilter};
use crate::events::RevocationEvent;

/// A handler registered for a set of topics.
#[derive(Clone)]
pub struct Subscription {
    pub filter: TopicFilter,
    pub handler: Arc<dyn EventHandler>,
}

/// Spawn one task per matching subscriber.
///
/// Publishing never waits on handlers, so a handler that publishes the next
/// step cannot deadlock the consumer. Handler errors are logged. Returns the
/// number of deliveries scheduled.
pub async fn spawn_deliveries(
    subscriptions: &Arc<RwLock<Vec<Subscription>>>,
    event: &Arc<RevocationEvent>,
) -> usize {
    let subscriptions_guard = subscriptions.read().await;
    let mut delivered = 0;

    for subscription in subscriptions_guard.iter() {
        if !subscription.filter.matches(event.topic) {
            continue;
        }
        delivered += 1;

        let handler = subscription.handler.clone();
        let event = Arc::clone(event);
        tokio::spawn(async move {
            let topic = event.topic;
            let correlation_id = event.options.correlation_id.clone();
            if let Err(e) = handler.handle(event).await {
                error!(
                    handler = handler.name(),
                    %topic,
                    %correlation_id,
                    error = %e,
                    "Handler failed"
                );
            }
        });
    }

    if delivered == 0 {
        debug!(topic = %event.topic, "No subscribers for topic");
    }
    delivered
}

/// Decode an event payload into its step-specific type.
pub fn decode_payload<T: DeserializeOwned>(event: &RevocationEvent) -> Result<T, BusError> {
    serde_json::from_value(event.payload.clone()).map_err(|e| BusError::Decode {
        topic: event.topic,
        message: e.to_string(),
    })
}
