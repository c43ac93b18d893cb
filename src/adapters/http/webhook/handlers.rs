//! HTTP handlers for the webhook endpoints.
//!
//! These handlers connect Axum routes to application layer command/query
//! handlers. The ingestion handler reads the raw body bytes so signature
//! verification runs over exactly what was transmitted.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use crate::application::handlers::webhook::{
    GetEventHandler, IngestEventCommand, IngestEventHandler, ListEventsHandler, ListEventsQuery,
    ReprocessEventCommand, ReprocessEventHandler,
};
use crate::domain::webhook::{WebhookError, WebhookVerifier};
use crate::ports::{JobQueue, WebhookEventStore};

use super::dto::{
    ErrorResponse, EventListResponse, EventResponse, HealthResponse, IngestResponse,
    ListEventsParams, ReprocessResponse,
};

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "Webhook-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned per request; dependencies are Arc-wrapped for cheap sharing.
#[derive(Clone)]
pub struct WebhookAppState {
    pub verifier: Arc<WebhookVerifier>,
    pub event_store: Arc<dyn WebhookEventStore>,
    pub queue: Arc<dyn JobQueue>,
}

impl WebhookAppState {
    /// Create handlers on demand from the shared state.
    pub fn ingest_handler(&self) -> IngestEventHandler {
        IngestEventHandler::new(
            self.verifier.clone(),
            self.event_store.clone(),
            self.queue.clone(),
        )
    }

    pub fn list_handler(&self) -> ListEventsHandler {
        ListEventsHandler::new(self.event_store.clone())
    }

    pub fn get_handler(&self) -> GetEventHandler {
        GetEventHandler::new(self.event_store.clone())
    }

    pub fn reprocess_handler(&self) -> ReprocessEventHandler {
        ReprocessEventHandler::new(self.event_store.clone(), self.queue.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Mapping
// ════════════════════════════════════════════════════════════════════════════════

/// Wrapper mapping pipeline errors onto HTTP responses.
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        WebhookApiError(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "webhook endpoint internal error");
        }
        let body = ErrorResponse::new(self.0.code(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/provider - the ingestion gate.
pub async fn ingest_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            WebhookError::ParseError(format!("missing {} header", SIGNATURE_HEADER))
        })?
        .to_string();

    let outcome = state
        .ingest_handler()
        .handle(IngestEventCommand {
            payload: body.to_vec(),
            signature,
        })
        .await?;

    Ok((
        StatusCode::OK,
        Json(IngestResponse {
            received: true,
            event_id: outcome.event.provider_event_id,
        }),
    ))
}

/// GET /webhooks/events - inspection listing.
pub async fn list_events(
    State(state): State<WebhookAppState>,
    Query(params): Query<ListEventsParams>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let events = state
        .list_handler()
        .handle(ListEventsQuery {
            processed: params.processed,
            event_type: params.event_type,
            limit: params.limit,
        })
        .await?;

    let events: Vec<EventResponse> = events.into_iter().map(EventResponse::from).collect();
    let count = events.len();
    Ok(Json(EventListResponse { events, count }))
}

/// GET /webhooks/events/:provider_event_id - single-event inspection.
pub async fn get_event(
    State(state): State<WebhookAppState>,
    Path(provider_event_id): Path<String>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let event = state.get_handler().handle(&provider_event_id).await?;
    Ok(Json(EventResponse::from(event)))
}

/// POST /webhooks/events/:provider_event_id/reprocess - operator re-enqueue.
pub async fn reprocess_event(
    State(state): State<WebhookAppState>,
    Path(provider_event_id): Path<String>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let outcome = state
        .reprocess_handler()
        .handle(ReprocessEventCommand { provider_event_id })
        .await?;

    Ok(Json(ReprocessResponse {
        event_id: outcome.event.provider_event_id,
        enqueued: outcome.enqueued,
    }))
}

/// GET /health - liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
