//! Static routing from request topics to step handlers.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::runner::StepRunner;
use super::steps::{
    RevListCreateStep, RevListStoreStep, RevRegActivationStep, RevRegDefCreateStep,
    RevRegDefStoreStep, RevRegFullHandlingStep,
};
use super::StepHandler;
use crate::events::{EventType, FullHandlingContext, RegistryFull, RevocationEvent};
use crate::interfaces::{BusError, EventHandler, RegistryLedger, RegistryStorage, TailsServer, TopicFilter};

/// One handler per step.
pub struct StepTable {
    pub def_create: RevRegDefCreateStep,
    pub def_store: RevRegDefStoreStep,
    pub list_create: RevListCreateStep,
    pub list_store: RevListStoreStep,
    pub activation: RevRegActivationStep,
    pub full_handling: RevRegFullHandlingStep,
}

impl StepTable {
    /// Build every step handler over the given collaborators.
    pub fn new(
        ledger: Arc<dyn RegistryLedger>,
        tails: Arc<dyn TailsServer>,
        storage: Arc<dyn RegistryStorage>,
    ) -> Self {
        Self {
            def_create: RevRegDefCreateStep::new(ledger.clone(), tails),
            def_store: RevRegDefStoreStep::new(storage.clone()),
            list_create: RevListCreateStep::new(ledger),
            list_store: RevListStoreStep::new(storage.clone()),
            activation: RevRegActivationStep::new(storage.clone()),
            full_handling: RevRegFullHandlingStep::new(storage),
        }
    }

    pub fn handler(&self, event_type: EventType) -> &dyn StepHandler {
        match event_type {
            EventType::RevRegDefCreate => &self.def_create,
            EventType::RevRegDefStore => &self.def_store,
            EventType::RevListCreate => &self.list_create,
            EventType::RevListStore => &self.list_store,
            EventType::RevRegActivation => &self.activation,
            EventType::RevRegFullHandling => &self.full_handling,
        }
    }
}

struct DispatcherInner {
    runner: StepRunner,
    steps: StepTable,
}

/// Bus subscriber running the requested step of every request topic.
#[derive(Clone)]
pub struct StepDispatcher {
    inner: Arc<DispatcherInner>,
}

impl StepDispatcher {
    pub fn new(runner: StepRunner, steps: StepTable) -> Self {
        Self {
            inner: Arc::new(DispatcherInner { runner, steps }),
        }
    }

    /// Every request topic.
    pub fn topics() -> TopicFilter {
        TopicFilter::topics(EventType::ALL.map(|t| t.request_topic()))
    }

    /// Run the step an event requests. Other topics are ignored.
    pub async fn dispatch(&self, event: &RevocationEvent) {
        match event.topic.requested_step() {
            Some(EventType::RevRegFullHandling) if event.options.full_handling.is_none() => {
                // Raised without context: the detection payload carries it.
                let mut event = event.clone();
                match serde_json::from_value::<RegistryFull>(event.payload.clone()) {
                    Ok(full) => {
                        event.options.full_handling = Some(FullHandlingContext::from(&full));
                    }
                    Err(e) => {
                        warn!(error = %e, "Full-detected payload is not a registry-full notice");
                    }
                }
                let handler = self.inner.steps.handler(EventType::RevRegFullHandling);
                self.inner.runner.run(handler, &event).await;
            }
            Some(event_type) => {
                let handler = self.inner.steps.handler(event_type);
                self.inner.runner.run(handler, event).await;
            }
            None => {
                warn!(topic = %event.topic, "Not a step request, ignoring");
            }
        }
    }
}

impl EventHandler for StepDispatcher {
    fn name(&self) -> &str {
        "revocation-steps"
    }

    fn handle(&self, event: Arc<RevocationEvent>) -> BoxFuture<'static, Result<(), BusError>> {
        let dispatcher = self.clone();
        Box::pin(async move {
            debug!(topic = %event.topic, "Dispatching step request");
            dispatcher.dispatch(&event).await;
            Ok(())
        })
    }
}
