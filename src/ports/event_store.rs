//! WebhookEventStore port - durable record of received webhook events.
//!
//! This port enables idempotent ingestion: the provider may deliver the
//! same event multiple times (network timeouts, 5xx responses, lost acks),
//! and every delivery must converge on a single stored row.
//!
//! Implementations must enforce uniqueness of the provider event ID with a
//! database constraint so concurrent ingestion cannot race past the
//! duplicate check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::webhook::{StoreError, StoredEvent};

/// Result of attempting to insert a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row was inserted (first time seeing this provider event ID).
    Inserted,
    /// A row for this provider event ID already exists.
    AlreadyExists,
}

/// Filter for the inspection listing.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub processed: Option<bool>,
    pub event_type: Option<String>,
    /// Page size; callers apply the default/maximum before passing it down.
    pub limit: u32,
}

/// Port for storing and querying received webhook events.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Inserts a new stored event with insert-if-absent semantics.
    ///
    /// Returns `AlreadyExists` when another ingestion won the race for the
    /// same provider event ID; the caller then falls back to the stored row.
    async fn insert(&self, event: &StoredEvent) -> Result<InsertOutcome, StoreError>;

    /// Finds a stored event by its provider event ID.
    async fn find_by_provider_id(
        &self,
        provider_event_id: &str,
    ) -> Result<Option<StoredEvent>, StoreError>;

    /// Finds a stored event by its internal ID.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredEvent>, StoreError>;

    /// Lists stored events newest-first, filtered and capped by `filter`.
    async fn list(&self, filter: EventFilter) -> Result<Vec<StoredEvent>, StoreError>;

    /// Records a failed processing attempt: overwrites the last error and
    /// increments the retry count.
    ///
    /// This write is intentionally outside the processing transaction so
    /// the error record survives the rollback of the domain mutation.
    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Deletes processed events older than the cutoff. Returns the number
    /// of rows removed. Used by the operator retention sweep.
    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
