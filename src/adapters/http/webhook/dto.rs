//! HTTP DTOs (Data Transfer Objects) for the webhook endpoints.
//!
//! These types define the JSON request/response structure for the webhook
//! API. They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::domain::webhook::StoredEvent;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Query parameters for the event listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsParams {
    /// Filter by processed state.
    pub processed: Option<bool>,
    /// Filter by exact event type.
    pub event_type: Option<String>,
    /// Page size (defaulted and capped server-side).
    pub limit: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Acknowledgment returned to the provider for an accepted delivery.
///
/// "Received" means durably stored, never "processed".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub received: bool,
    pub event_id: String,
}

/// Stored event view for the inspection endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub event_id: String,
    pub event_type: String,
    pub processed: bool,
    pub processed_at: Option<String>,
    pub last_error: Option<String>,
    pub retry_count: i32,
    pub created_at: String,
    pub payload: serde_json::Value,
}

impl From<StoredEvent> for EventResponse {
    fn from(event: StoredEvent) -> Self {
        EventResponse {
            event_id: event.provider_event_id,
            event_type: event.event_type,
            processed: event.processed,
            processed_at: event.processed_at.map(|t| t.to_rfc3339()),
            last_error: event.last_error,
            retry_count: event.retry_count,
            created_at: event.created_at.to_rfc3339(),
            payload: event.payload,
        }
    }
}

/// Listing envelope.
#[derive(Debug, Clone, Serialize)]
pub struct EventListResponse {
    pub events: Vec<EventResponse>,
    pub count: usize,
}

/// Response for a manual reprocess request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessResponse {
    pub event_id: String,
    pub enqueued: bool,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
