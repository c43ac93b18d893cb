//! Error types for webhook ingestion and event processing.
//!
//! Defines the error taxonomy for the pipeline, with HTTP status code
//! mapping for the ingestion boundary and retryability semantics for
//! the worker side.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised by the store ports (event store and billing store).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Stored payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Creates a database error from any displayable source.
    pub fn database(err: impl std::fmt::Display) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Errors that occur at the ingestion and inspection boundary.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is older than the freshness window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse the signature header or event payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No stored event exists for the given provider event ID.
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// Manual reprocessing was requested for an already-processed event.
    #[error("Event already processed: {0}")]
    AlreadyProcessed(String),

    /// Job queue refused the enqueue request.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl WebhookError {
    /// Maps the error to the HTTP status returned to the provider or operator.
    ///
    /// The provider retries on 5xx, so only genuinely transient failures
    /// may map there; client-caused failures must stay 4xx.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::InvalidTimestamp | WebhookError::ParseError(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::EventNotFound(_) => StatusCode::NOT_FOUND,
            WebhookError::AlreadyProcessed(_) => StatusCode::CONFLICT,
            WebhookError::Queue(_) | WebhookError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
            WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
            WebhookError::ParseError(_) => "PARSE_ERROR",
            WebhookError::EventNotFound(_) => "EVENT_NOT_FOUND",
            WebhookError::AlreadyProcessed(_) => "ALREADY_PROCESSED",
            WebhookError::Queue(_) => "QUEUE_ERROR",
            WebhookError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Errors raised while a worker processes a dequeued job.
///
/// A `ProcessingError` is recorded on the stored event and then propagated
/// so the queue's retry/backoff mechanics take over.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Store operation failed inside or around the processing transaction.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Stored payload could not be deserialized into a provider event.
    #[error("malformed payload: {0}")]
    Payload(String),
}
