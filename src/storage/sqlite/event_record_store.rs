//! SQLite EventRecordStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_query::{Expr, Order, Query, SimpleExpr, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::events::{EventRecord, EventType, RecordKey, RecordState};
use crate::interfaces::event_record_store::{EventRecordStore, Result, StorageError};
use crate::storage::schema::{
    EventRecords, CREATE_EVENT_RECORDS_STATE_INDEX, CREATE_EVENT_RECORDS_TABLE,
};

const COLUMNS: [EventRecords; 15] = [
    EventRecords::Profile,
    EventRecords::CorrelationId,
    EventRecords::EventType,
    EventRecords::State,
    EventRecords::RequestId,
    EventRecords::EventPayload,
    EventRecords::Options,
    EventRecords::ResponsePayload,
    EventRecords::ErrorMessage,
    EventRecords::ShouldRetry,
    EventRecords::RetryCount,
    EventRecords::ExpiryTimestamp,
    EventRecords::CreatedAt,
    EventRecords::UpdatedAt,
    EventRecords::Version,
];

/// SQLite implementation of EventRecordStore.
pub struct SqliteEventRecordStore {
    pool: SqlitePool,
}

impl SqliteEventRecordStore {
    /// Create a new SQLite event record store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table and indexes if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_EVENT_RECORDS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_EVENT_RECORDS_STATE_INDEX)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn key_filter(key: &RecordKey) -> SimpleExpr {
        Expr::col(EventRecords::Profile)
            .eq(key.profile.as_str())
            .and(Expr::col(EventRecords::CorrelationId).eq(key.correlation_id.as_str()))
            .and(Expr::col(EventRecords::EventType).eq(key.event_type.as_str()))
    }

    async fn fetch(&self, query: String) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(decode_row(&row)?);
        }
        Ok(records)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn optional_json(value: &Option<serde_json::Value>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

fn decode_row(row: &SqliteRow) -> Result<EventRecord> {
    let profile: String = row.try_get("profile")?;
    let correlation_id: String = row.try_get("correlation_id")?;
    let event_type: String = row.try_get("event_type")?;

    let corrupt = |message: String| StorageError::Corrupt {
        key: format!("{profile}/{correlation_id}/{event_type}"),
        message,
    };
    let parse_time = |column: &str| -> Result<DateTime<Utc>> {
        let raw: String = row.try_get(column)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("{column}: {e}")))
    };

    let parsed_type: EventType = event_type.parse().map_err(|e| corrupt(format!("{e}")))?;
    let state: String = row.try_get("state")?;
    let state: RecordState = state.parse().map_err(|e| corrupt(format!("{e}")))?;

    let event_payload: String = row.try_get("event_payload")?;
    let options: String = row.try_get("options")?;
    let response_payload: Option<String> = row.try_get("response_payload")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let version: i64 = row.try_get("version")?;

    Ok(EventRecord {
        event_type: parsed_type,
        state,
        request_id: row.try_get("request_id")?,
        event_payload: serde_json::from_str(&event_payload)?,
        options: serde_json::from_str(&options)?,
        response_payload: response_payload
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
        error_message: row.try_get("error_message")?,
        should_retry: row.try_get("should_retry")?,
        retry_count: u32::try_from(retry_count)
            .map_err(|_| corrupt(format!("retry_count out of range: {retry_count}")))?,
        expiry_timestamp: parse_time("expiry_timestamp")?,
        created_at: parse_time("created_at")?,
        updated_at: parse_time("updated_at")?,
        version: version as u64,
        profile,
        correlation_id,
    })
}

#[async_trait]
impl EventRecordStore for SqliteEventRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<EventRecord>> {
        let query = Query::select()
            .columns(COLUMNS)
            .from(EventRecords::Table)
            .cond_where(Self::key_filter(key))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn insert(&self, record: &EventRecord) -> Result<()> {
        let query = Query::insert()
            .into_table(EventRecords::Table)
            .columns(COLUMNS)
            .values_panic([
                record.profile.as_str().into(),
                record.correlation_id.as_str().into(),
                record.event_type.as_str().into(),
                record.state.as_str().into(),
                record.request_id.clone().into(),
                serde_json::to_string(&record.event_payload)?.into(),
                serde_json::to_string(&record.options)?.into(),
                optional_json(&record.response_payload)?.into(),
                record.error_message.clone().into(),
                record.should_retry.into(),
                i64::from(record.retry_count).into(),
                timestamp(record.expiry_timestamp).into(),
                timestamp(record.created_at).into(),
                timestamp(record.updated_at).into(),
                (record.version as i64).into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::AlreadyExists(record.key()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, record: &EventRecord, expected_version: u64) -> Result<()> {
        let key = record.key();
        let query = Query::update()
            .table(EventRecords::Table)
            .values([
                (EventRecords::State, record.state.as_str().into()),
                (EventRecords::RequestId, record.request_id.clone().into()),
                (
                    EventRecords::EventPayload,
                    serde_json::to_string(&record.event_payload)?.into(),
                ),
                (
                    EventRecords::Options,
                    serde_json::to_string(&record.options)?.into(),
                ),
                (
                    EventRecords::ResponsePayload,
                    optional_json(&record.response_payload)?.into(),
                ),
                (EventRecords::ErrorMessage, record.error_message.clone().into()),
                (EventRecords::ShouldRetry, record.should_retry.into()),
                (EventRecords::RetryCount, i64::from(record.retry_count).into()),
                (
                    EventRecords::ExpiryTimestamp,
                    timestamp(record.expiry_timestamp).into(),
                ),
                (EventRecords::UpdatedAt, timestamp(record.updated_at).into()),
                (EventRecords::Version, (record.version as i64).into()),
            ])
            .cond_where(Self::key_filter(&key))
            .and_where(Expr::col(EventRecords::Version).eq(expected_version as i64))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing matched: the record is gone or another writer bumped the version.
        match self.get(&key).await? {
            None => Err(StorageError::NotFound(key)),
            Some(_) => Err(StorageError::VersionConflict {
                key,
                expected: expected_version,
            }),
        }
    }

    async fn list_by_states(&self, profile: &str, states: &[RecordState]) -> Result<Vec<EventRecord>> {
        if states.is_empty() {
            return Ok(vec![]);
        }

        let query = Query::select()
            .columns(COLUMNS)
            .from(EventRecords::Table)
            .and_where(Expr::col(EventRecords::Profile).eq(profile))
            .and_where(Expr::col(EventRecords::State).is_in(states.iter().map(|s| s.as_str())))
            .order_by(EventRecords::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        self.fetch(query).await
    }

    async fn list_by_correlation(&self, profile: &str, correlation_id: &str) -> Result<Vec<EventRecord>> {
        let query = Query::select()
            .columns(COLUMNS)
            .from(EventRecords::Table)
            .and_where(Expr::col(EventRecords::Profile).eq(profile))
            .and_where(Expr::col(EventRecords::CorrelationId).eq(correlation_id))
            .order_by(EventRecords::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        self.fetch(query).await
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool> {
        let query = Query::delete()
            .from_table(EventRecords::Table)
            .cond_where(Self::key_filter(key))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
