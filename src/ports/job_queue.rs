//! JobQueue port - durable, dedup-keyed work queue with delivery-and-retry.
//!
//! The dedup key is the provider event ID, so concurrent or repeated
//! enqueue calls for the same event converge to one live job. Retry and
//! backoff scheduling live entirely inside the queue; handlers only signal
//! success or failure and never sleep or schedule retries themselves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::webhook::ProcessingError;

/// The unit of work derived from a stored event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventJob {
    /// Internal stored-event ID.
    pub event_id: Uuid,
    /// Provider event ID; doubles as the queue dedup key.
    pub provider_event_id: String,
    /// Event type tag, for routing and logging.
    pub event_type: String,
    /// Full serialized event at enqueue time.
    pub payload: serde_json::Value,
    /// Stored retry count at enqueue time.
    pub retry_count: i32,
}

impl EventJob {
    /// The queue dedup key for this job.
    pub fn dedup_key(&self) -> &str {
        &self.provider_event_id
    }
}

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was accepted under the given job ID.
    Enqueued(Uuid),
    /// A live job already exists for the dedup key; nothing was added.
    Duplicate,
}

/// Errors raised by the queue itself.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue has been closed and accepts no further work.
    #[error("queue is closed")]
    Closed,
}

/// Consumer side: processes one delivered job.
///
/// `attempt` is queue-owned and starts at 1 for the first delivery.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn process(&self, job: &EventJob, attempt: u32) -> Result<(), ProcessingError>;
}

/// Producer side of the queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job unless a live job for its dedup key already exists.
    async fn enqueue(&self, job: EventJob) -> Result<EnqueueOutcome, QueueError>;

    /// Whether a live (non-terminal) job exists for the dedup key.
    async fn exists(&self, dedup_key: &str) -> bool;

    /// Stops accepting work and drains in-flight jobs.
    async fn close(&self);
}
