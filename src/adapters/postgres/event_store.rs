//! PostgreSQL implementation of WebhookEventStore.
//!
//! The `provider_event_id` unique constraint is the idempotency backstop:
//! concurrent ingestion of the same event races into `ON CONFLICT DO
//! NOTHING`, and the loser converges on the stored row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::webhook::{StoreError, StoredEvent};
use crate::ports::{EventFilter, InsertOutcome, WebhookEventStore};

/// PostgreSQL implementation of the WebhookEventStore port.
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a stored webhook event.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct EventRow {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        StoredEvent {
            id: row.id,
            provider_event_id: row.provider_event_id,
            event_type: row.event_type,
            payload: row.payload,
            processed: row.processed,
            processed_at: row.processed_at,
            last_error: row.last_error,
            retry_count: row.retry_count,
            created_at: row.created_at,
        }
    }
}

pub(super) const SELECT_EVENT: &str = "SELECT id, provider_event_id, event_type, payload, \
     processed, processed_at, last_error, retry_count, created_at FROM webhook_events";

#[async_trait]
impl WebhookEventStore for PostgresEventStore {
    async fn insert(&self, event: &StoredEvent) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT INTO webhook_events \
             (id, provider_event_id, event_type, payload, processed, processed_at, \
              last_error, retry_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (provider_event_id) DO NOTHING",
        )
        .bind(event.id)
        .bind(&event.provider_event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.processed)
        .bind(event.processed_at)
        .bind(&event.last_error)
        .bind(event.retry_count)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn find_by_provider_id(
        &self,
        provider_event_id: &str,
    ) -> Result<Option<StoredEvent>, StoreError> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("{} WHERE provider_event_id = $1", SELECT_EVENT))
                .bind(provider_event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::database)?;

        Ok(row.map(StoredEvent::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredEvent>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_EVENT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::database)?;

        Ok(row.map(StoredEvent::from))
    }

    async fn list(&self, filter: EventFilter) -> Result<Vec<StoredEvent>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "{} WHERE ($1::boolean IS NULL OR processed = $1) \
               AND ($2::text IS NULL OR event_type = $2) \
             ORDER BY created_at DESC LIMIT $3",
            SELECT_EVENT
        ))
        .bind(filter.processed)
        .bind(filter.event_type)
        .bind(filter.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE webhook_events \
             SET last_error = $2, retry_count = retry_count + 1 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(())
    }

    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM webhook_events WHERE processed = TRUE AND created_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(StoreError::database)?;

        Ok(result.rows_affected())
    }
}
