//! ReprocessEventHandler - manual re-enqueue of a stored unprocessed event.
//!
//! Operator escape hatch for events whose enqueue was lost or whose job
//! exhausted its retries. Already-processed events are refused: domain
//! transitions are idempotent, but reprocessing a completed event is
//! operator error until explicitly forced through other means.

use std::sync::Arc;

use crate::domain::webhook::{StoredEvent, WebhookError};
use crate::ports::{EnqueueOutcome, EventJob, JobQueue, WebhookEventStore};

/// Command identifying the event to reprocess by its provider event ID.
#[derive(Debug, Clone)]
pub struct ReprocessEventCommand {
    pub provider_event_id: String,
}

/// Outcome of a reprocess request.
#[derive(Debug, Clone)]
pub struct ReprocessOutcome {
    pub event: StoredEvent,
    /// False when a live job already covers this event.
    pub enqueued: bool,
}

/// Handler for manual reprocessing.
pub struct ReprocessEventHandler {
    event_store: Arc<dyn WebhookEventStore>,
    queue: Arc<dyn JobQueue>,
}

impl ReprocessEventHandler {
    pub fn new(event_store: Arc<dyn WebhookEventStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { event_store, queue }
    }

    pub async fn handle(
        &self,
        cmd: ReprocessEventCommand,
    ) -> Result<ReprocessOutcome, WebhookError> {
        let event = self
            .event_store
            .find_by_provider_id(&cmd.provider_event_id)
            .await?
            .ok_or_else(|| WebhookError::EventNotFound(cmd.provider_event_id.clone()))?;

        if event.processed {
            return Err(WebhookError::AlreadyProcessed(cmd.provider_event_id));
        }

        if self.queue.exists(&event.provider_event_id).await {
            tracing::debug!(
                provider_event_id = %event.provider_event_id,
                "reprocess requested but a live job already exists"
            );
            return Ok(ReprocessOutcome {
                event,
                enqueued: false,
            });
        }

        let job = EventJob {
            event_id: event.id,
            provider_event_id: event.provider_event_id.clone(),
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            retry_count: event.retry_count,
        };
        let enqueued = match self
            .queue
            .enqueue(job)
            .await
            .map_err(|e| WebhookError::Queue(e.to_string()))?
        {
            EnqueueOutcome::Enqueued(_) => true,
            EnqueueOutcome::Duplicate => false,
        };

        tracing::info!(
            provider_event_id = %event.provider_event_id,
            enqueued,
            "manual reprocess requested"
        );

        Ok(ReprocessOutcome { event, enqueued })
    }
}
