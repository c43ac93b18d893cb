//! Axum router configuration for the webhook endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{
    get_event, health, ingest_webhook, list_events, reprocess_event, WebhookAppState,
};

/// Create the webhook module router.
///
/// # Routes
///
/// ## Provider Endpoint (no auth, signature verified)
/// - `POST /webhooks/provider` - Webhook ingestion gate
///
/// ## Inspection Endpoints
/// - `GET /webhooks/events` - List stored events
/// - `GET /webhooks/events/:provider_event_id` - Fetch one stored event
///
/// ## Operator Endpoints
/// - `POST /webhooks/events/:provider_event_id/reprocess` - Re-enqueue an
///   unprocessed event
///
/// ## Infrastructure
/// - `GET /health` - Liveness probe
pub fn webhook_router(state: WebhookAppState) -> Router {
    let webhooks = Router::new()
        .route("/provider", post(ingest_webhook))
        .route("/events", get(list_events))
        .route("/events/:provider_event_id", get(get_event))
        .route(
            "/events/:provider_event_id/reprocess",
            post(reprocess_event),
        );

    Router::new()
        .nest("/webhooks", webhooks)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
