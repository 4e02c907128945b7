//! Revocation workflow events and persisted step records.
//!
//! This module contains:
//! - `EventType`: the closed set of saga steps
//! - `Topic`: bus topics, serialized as the documented `anoncreds::...` strings
//! - `EventOptions` / `RevocationEvent`: the envelope carried on the bus
//! - `EventRecord`: one persisted step attempt, with its state transitions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod payloads;

pub use payloads::{
    ActivationRequest, CredDefFinished, FullHandlingCompleted, FullHandlingContext,
    RegistryFull, RegistrySummary, RevListCreateRequest, RevListStoreRequest,
    RevRegDefCreateRequest, RevRegDefStoreRequest,
};

// ============================================================================
// Event types and states
// ============================================================================

/// One step of a revocation registry saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RevRegDefCreate,
    RevRegDefStore,
    RevListCreate,
    RevListStore,
    RevRegActivation,
    RevRegFullHandling,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::RevRegDefCreate,
        EventType::RevRegDefStore,
        EventType::RevListCreate,
        EventType::RevListStore,
        EventType::RevRegActivation,
        EventType::RevRegFullHandling,
    ];

    /// Stable name used as the storage discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RevRegDefCreate => "rev_reg_def_create",
            EventType::RevRegDefStore => "rev_reg_def_store",
            EventType::RevListCreate => "rev_list_create",
            EventType::RevListStore => "rev_list_store",
            EventType::RevRegActivation => "rev_reg_activation",
            EventType::RevRegFullHandling => "rev_reg_full_handling",
        }
    }

    /// Topic that requests this step.
    pub fn request_topic(&self) -> Topic {
        match self {
            EventType::RevRegDefCreate => Topic::RevRegDefCreateRequested,
            EventType::RevRegDefStore => Topic::RevRegDefStoreRequested,
            EventType::RevListCreate => Topic::RevListCreateRequested,
            EventType::RevListStore => Topic::RevListStoreRequested,
            EventType::RevRegActivation => Topic::RevRegActivationRequested,
            EventType::RevRegFullHandling => Topic::RevRegFullDetected,
        }
    }

    /// Topic announcing a successful step, if the step has one.
    ///
    /// Full handling has no per-step response; its completion is announced
    /// once the replacement backup exists.
    pub fn response_topic(&self) -> Option<Topic> {
        match self {
            EventType::RevRegDefCreate => Some(Topic::RevRegDefCreateResponse),
            EventType::RevRegDefStore => Some(Topic::RevRegDefStoreResponse),
            EventType::RevListCreate => Some(Topic::RevListCreateResponse),
            EventType::RevListStore => Some(Topic::RevListStoreResponse),
            EventType::RevRegActivation => Some(Topic::RevRegActivationResponse),
            EventType::RevRegFullHandling => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// Lifecycle state of an `EventRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Requested,
    ResponseSuccess,
    ResponseFailure,
}

impl RecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Requested => "requested",
            RecordState::ResponseSuccess => "response_success",
            RecordState::ResponseFailure => "response_failure",
        }
    }

    /// Requested and failed records are still owed work.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, RecordState::Requested | RecordState::ResponseFailure)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordState {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(RecordState::Requested),
            "response_success" => Ok(RecordState::ResponseSuccess),
            "response_failure" => Ok(RecordState::ResponseFailure),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

/// Returned when a stored or received name matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown name: {0}")]
pub struct UnknownName(pub String);

// ============================================================================
// Topics
// ============================================================================

/// Bus topic. The serialized form is the wire contract with external consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "anoncreds::credential-definition::finished")]
    CredDefFinished,
    #[serde(rename = "anoncreds::rev-reg-def::create-requested")]
    RevRegDefCreateRequested,
    #[serde(rename = "anoncreds::rev-reg-def::create-response")]
    RevRegDefCreateResponse,
    #[serde(rename = "anoncreds::rev-reg-def::store-requested")]
    RevRegDefStoreRequested,
    #[serde(rename = "anoncreds::rev-reg-def::store-response")]
    RevRegDefStoreResponse,
    #[serde(rename = "anoncreds::revocation-list::create-requested")]
    RevListCreateRequested,
    #[serde(rename = "anoncreds::revocation-list::create-response")]
    RevListCreateResponse,
    #[serde(rename = "anoncreds::revocation-list::store-requested")]
    RevListStoreRequested,
    #[serde(rename = "anoncreds::revocation-list::store-response")]
    RevListStoreResponse,
    #[serde(rename = "anoncreds::revocation-list::finished")]
    RevListFinished,
    #[serde(rename = "anoncreds::revocation-registry::activation-requested")]
    RevRegActivationRequested,
    #[serde(rename = "anoncreds::revocation-registry::activation-response")]
    RevRegActivationResponse,
    #[serde(rename = "anoncreds::revocation-registry::full-detected")]
    RevRegFullDetected,
    #[serde(rename = "anoncreds::revocation-registry::full-handling-completed")]
    RevRegFullHandlingCompleted,
}

impl Topic {
    pub const ALL: [Topic; 14] = [
        Topic::CredDefFinished,
        Topic::RevRegDefCreateRequested,
        Topic::RevRegDefCreateResponse,
        Topic::RevRegDefStoreRequested,
        Topic::RevRegDefStoreResponse,
        Topic::RevListCreateRequested,
        Topic::RevListCreateResponse,
        Topic::RevListStoreRequested,
        Topic::RevListStoreResponse,
        Topic::RevListFinished,
        Topic::RevRegActivationRequested,
        Topic::RevRegActivationResponse,
        Topic::RevRegFullDetected,
        Topic::RevRegFullHandlingCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CredDefFinished => "anoncreds::credential-definition::finished",
            Topic::RevRegDefCreateRequested => "anoncreds::rev-reg-def::create-requested",
            Topic::RevRegDefCreateResponse => "anoncreds::rev-reg-def::create-response",
            Topic::RevRegDefStoreRequested => "anoncreds::rev-reg-def::store-requested",
            Topic::RevRegDefStoreResponse => "anoncreds::rev-reg-def::store-response",
            Topic::RevListCreateRequested => "anoncreds::revocation-list::create-requested",
            Topic::RevListCreateResponse => "anoncreds::revocation-list::create-response",
            Topic::RevListStoreRequested => "anoncreds::revocation-list::store-requested",
            Topic::RevListStoreResponse => "anoncreds::revocation-list::store-response",
            Topic::RevListFinished => "anoncreds::revocation-list::finished",
            Topic::RevRegActivationRequested => {
                "anoncreds::revocation-registry::activation-requested"
            }
            Topic::RevRegActivationResponse => {
                "anoncreds::revocation-registry::activation-response"
            }
            Topic::RevRegFullDetected => "anoncreds::revocation-registry::full-detected",
            Topic::RevRegFullHandlingCompleted => {
                "anoncreds::revocation-registry::full-handling-completed"
            }
        }
    }

    /// The step a request topic triggers, if this is a request topic.
    pub fn requested_step(&self) -> Option<EventType> {
        EventType::ALL
            .into_iter()
            .find(|t| t.request_topic() == *self)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Options carried with every event of a saga.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOptions {
    /// Shared by every record of one saga instance.
    pub correlation_id: String,
    /// Secondary correlator for request/response pairing on re-emission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub retry_count: u32,
    /// Set when re-emitted by recovery; handlers check stored state first.
    pub recovery: bool,
    /// Activate the registry once its revocation list is stored.
    pub set_active: bool,
    /// Start a backup registry run after activation.
    pub create_backup: bool,
    /// Correlation of the full-handling run that spawned this setup run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_handling: Option<FullHandlingContext>,
}

impl EventOptions {
    /// Options for the first event of a new saga instance.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Default::default()
        }
    }

    /// Generate a fresh correlation id.
    pub fn fresh() -> Self {
        Self::new(new_correlation_id())
    }

    pub fn with_set_active(mut self, set_active: bool) -> Self {
        self.set_active = set_active;
        self
    }

    pub fn with_create_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }

    pub fn with_full_handling(mut self, context: FullHandlingContext) -> Self {
        self.full_handling = Some(context);
        self
    }

    pub fn with_parent(mut self, parent_correlation_id: impl Into<String>) -> Self {
        self.parent_correlation_id = Some(parent_correlation_id.into());
        self
    }

    /// Options for the next step of the same saga: same correlation, fresh attempt.
    pub fn for_next_step(&self) -> Self {
        Self {
            request_id: None,
            retry_count: 0,
            recovery: false,
            ..self.clone()
        }
    }

    /// Whether this run was spawned by full handling.
    pub fn is_nested(&self) -> bool {
        self.parent_correlation_id.is_some()
    }
}

/// Generate a correlation id for a new saga instance.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Event carried on the bus: `{ topic, profile, payload, options }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevocationEvent {
    pub topic: Topic,
    /// Profile/tenant whose records and collaborators the event acts on.
    pub profile: String,
    pub payload: Value,
    #[serde(default)]
    pub options: EventOptions,
}

impl RevocationEvent {
    pub fn new(topic: Topic, profile: impl Into<String>, payload: Value, options: EventOptions) -> Self {
        Self {
            topic,
            profile: profile.into(),
            payload,
            options,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.options.correlation_id
    }
}

// ============================================================================
// Records
// ============================================================================

/// Identity of a record: one current record per (profile, correlation, step).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub profile: String,
    pub correlation_id: String,
    pub event_type: EventType,
}

impl RecordKey {
    pub fn new(profile: &str, correlation_id: &str, event_type: EventType) -> Self {
        Self {
            profile: profile.to_string(),
            correlation_id: correlation_id.to_string(),
            event_type,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.profile, self.correlation_id, self.event_type)
    }
}

/// Rejected state change on an `EventRecord`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot {action} a {event_type} record in state {state}")]
pub struct TransitionError {
    pub event_type: EventType,
    pub state: RecordState,
    pub action: &'static str,
}

/// One persisted workflow-step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub profile: String,
    pub event_type: EventType,
    pub state: RecordState,
    pub correlation_id: String,
    pub request_id: Option<String>,
    /// Step input: target identifiers.
    pub event_payload: Value,
    /// Options the request was emitted with.
    pub options: EventOptions,
    /// Present only in `ResponseSuccess`.
    pub response_payload: Option<Value>,
    /// Present only in `ResponseFailure`.
    pub error_message: Option<String>,
    /// Present only in `ResponseFailure`.
    pub should_retry: Option<bool>,
    pub retry_count: u32,
    /// After this instant an unfinished record may be re-emitted by recovery.
    pub expiry_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: u64,
}

impl EventRecord {
    /// New record in `Requested`.
    pub fn requested(
        profile: &str,
        event_type: EventType,
        payload: Value,
        options: &EventOptions,
        expiry_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            profile: profile.to_string(),
            event_type,
            state: RecordState::Requested,
            correlation_id: options.correlation_id.clone(),
            request_id: options.request_id.clone(),
            event_payload: payload,
            options: options.clone(),
            response_payload: None,
            error_message: None,
            should_retry: None,
            retry_count: options.retry_count,
            expiry_timestamp,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.profile, &self.correlation_id, self.event_type)
    }

    /// Overwrite with a new request for the same (correlation, step).
    ///
    /// `retry_count` never decreases.
    pub fn rerequest(
        &mut self,
        payload: Value,
        options: &EventOptions,
        expiry_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.state = RecordState::Requested;
        self.request_id = options.request_id.clone();
        self.event_payload = payload;
        self.options = options.clone();
        self.response_payload = None;
        self.error_message = None;
        self.should_retry = None;
        self.retry_count = self.retry_count.max(options.retry_count);
        self.expiry_timestamp = expiry_timestamp;
        self.touch(now);
    }

    /// `Requested -> ResponseSuccess`.
    pub fn mark_success(&mut self, response: Value, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require(RecordState::Requested, "record success for")?;
        self.state = RecordState::ResponseSuccess;
        self.response_payload = Some(response);
        self.error_message = None;
        self.should_retry = None;
        self.touch(now);
        Ok(())
    }

    /// `Requested -> ResponseFailure`.
    pub fn mark_failure(
        &mut self,
        error_message: impl Into<String>,
        should_retry: bool,
        expiry_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.require(RecordState::Requested, "record failure for")?;
        self.state = RecordState::ResponseFailure;
        self.response_payload = None;
        self.error_message = Some(error_message.into());
        self.should_retry = Some(should_retry);
        self.expiry_timestamp = expiry_timestamp;
        self.touch(now);
        Ok(())
    }

    /// `ResponseFailure -> Requested`, or a stalled `Requested` re-armed.
    pub fn reset_for_retry(
        &mut self,
        expiry_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.state == RecordState::ResponseSuccess {
            return Err(self.transition_error("retry"));
        }
        self.state = RecordState::Requested;
        self.error_message = None;
        self.should_retry = None;
        self.retry_count = self.retry_count.saturating_add(1);
        self.options.retry_count = self.retry_count;
        self.expiry_timestamp = expiry_timestamp;
        self.touch(now);
        Ok(())
    }

    /// Replace the stored response of a successful record.
    pub fn amend_response(&mut self, response: Value, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require(RecordState::ResponseSuccess, "amend the response of")?;
        self.response_payload = Some(response);
        self.touch(now);
        Ok(())
    }

    /// Whether a recovery scan at `now` may re-emit this record.
    pub fn is_recoverable_at(&self, now: DateTime<Utc>, retry_permanent_failures: bool) -> bool {
        if !self.state.is_in_progress() || self.expiry_timestamp > now {
            return false;
        }
        match (self.state, self.should_retry) {
            (RecordState::ResponseFailure, Some(false)) => retry_permanent_failures,
            _ => true,
        }
    }

    fn require(&self, expected: RecordState, action: &'static str) -> Result<(), TransitionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.transition_error(action))
        }
    }

    fn transition_error(&self, action: &'static str) -> TransitionError {
        TransitionError {
            event_type: self.event_type,
            state: self.state,
            action,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version = self.version.wrapping_add(1);
    }
}
