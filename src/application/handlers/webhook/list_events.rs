//! ListEventsHandler - inspection listing of stored events.

use std::sync::Arc;

use crate::domain::webhook::{StoredEvent, WebhookError};
use crate::ports::{EventFilter, WebhookEventStore};

/// Default page size when the caller does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Hard cap on the page size.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Query for the event listing.
#[derive(Debug, Clone, Default)]
pub struct ListEventsQuery {
    pub processed: Option<bool>,
    pub event_type: Option<String>,
    pub limit: Option<u32>,
}

/// Handler for the inspection listing.
pub struct ListEventsHandler {
    event_store: Arc<dyn WebhookEventStore>,
}

impl ListEventsHandler {
    pub fn new(event_store: Arc<dyn WebhookEventStore>) -> Self {
        Self { event_store }
    }

    pub async fn handle(&self, query: ListEventsQuery) -> Result<Vec<StoredEvent>, WebhookError> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let events = self
            .event_store
            .list(EventFilter {
                processed: query.processed,
                event_type: query.event_type,
                limit,
            })
            .await?;

        Ok(events)
    }
}
