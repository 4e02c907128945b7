//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Event records table schema.
#[derive(Iden)]
pub enum EventRecords {
    #[iden = "revocation_event_records"]
    Table,
    #[iden = "profile"]
    Profile,
    #[iden = "correlation_id"]
    CorrelationId,
    #[iden = "event_type"]
    EventType,
    #[iden = "state"]
    State,
    #[iden = "request_id"]
    RequestId,
    #[iden = "event_payload"]
    EventPayload,
    #[iden = "options"]
    Options,
    #[iden = "response_payload"]
    ResponsePayload,
    #[iden = "error_message"]
    ErrorMessage,
    #[iden = "should_retry"]
    ShouldRetry,
    #[iden = "retry_count"]
    RetryCount,
    #[iden = "expiry_timestamp"]
    ExpiryTimestamp,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "version"]
    Version,
}

/// SQL for creating the event records table.
pub const CREATE_EVENT_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS revocation_event_records (
    profile TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    state TEXT NOT NULL,
    request_id TEXT,
    event_payload TEXT NOT NULL,
    options TEXT NOT NULL,
    response_payload TEXT,
    error_message TEXT,
    should_retry INTEGER,
    retry_count INTEGER NOT NULL DEFAULT 0,
    expiry_timestamp TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (profile, correlation_id, event_type)
)
"#;

/// SQL for the recovery scan index.
pub const CREATE_EVENT_RECORDS_STATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_revocation_event_records_profile_state
    ON revocation_event_records(profile, state)
"#;
