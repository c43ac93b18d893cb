//! GetEventHandler - fetches one stored event by provider event ID.

use std::sync::Arc;

use crate::domain::webhook::{StoredEvent, WebhookError};
use crate::ports::WebhookEventStore;

/// Handler for single-event inspection.
pub struct GetEventHandler {
    event_store: Arc<dyn WebhookEventStore>,
}

impl GetEventHandler {
    pub fn new(event_store: Arc<dyn WebhookEventStore>) -> Self {
        Self { event_store }
    }

    pub async fn handle(&self, provider_event_id: &str) -> Result<StoredEvent, WebhookError> {
        self.event_store
            .find_by_provider_id(provider_event_id)
            .await?
            .ok_or_else(|| WebhookError::EventNotFound(provider_event_id.to_string()))
    }
}
