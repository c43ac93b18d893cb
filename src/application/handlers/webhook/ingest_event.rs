//! IngestEventHandler - verifies, persists, and enqueues an incoming webhook.
//!
//! The ingestion gate's contract with the provider: a 2xx acknowledgment
//! means "durably stored", never "processed". Persist-then-enqueue, so an
//! acknowledged event survives a crash between the two steps and can be
//! healed by redelivery or manual reprocessing.

use std::sync::Arc;

use crate::domain::webhook::{StoredEvent, WebhookError, WebhookVerifier};
use crate::ports::{EnqueueOutcome, EventJob, InsertOutcome, JobQueue, WebhookEventStore};

/// Command carrying the raw delivery exactly as received.
#[derive(Debug, Clone)]
pub struct IngestEventCommand {
    /// Raw request body bytes; verification runs over these, unparsed.
    pub payload: Vec<u8>,
    /// Signature header value.
    pub signature: String,
}

/// Outcome of an accepted ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The stored row for this provider event ID (new or pre-existing).
    pub event: StoredEvent,
    /// Whether this request enqueued a job (false for pure duplicates).
    pub enqueued: bool,
}

/// Handler for the ingestion gate.
pub struct IngestEventHandler {
    verifier: Arc<WebhookVerifier>,
    event_store: Arc<dyn WebhookEventStore>,
    queue: Arc<dyn JobQueue>,
}

impl IngestEventHandler {
    pub fn new(
        verifier: Arc<WebhookVerifier>,
        event_store: Arc<dyn WebhookEventStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            verifier,
            event_store,
            queue,
        }
    }

    pub async fn handle(&self, cmd: IngestEventCommand) -> Result<IngestOutcome, WebhookError> {
        // 1. Verify the signature over the raw bytes; nothing is stored for
        //    deliveries that fail here.
        let event = self
            .verifier
            .verify_and_parse(&cmd.payload, &cmd.signature)?;

        let payload: serde_json::Value = serde_json::from_slice(&cmd.payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        // 2. Idempotency check on the provider event ID.
        if let Some(existing) = self.event_store.find_by_provider_id(&event.id).await? {
            if existing.processed {
                tracing::debug!(
                    provider_event_id = %event.id,
                    "duplicate delivery of processed event, acknowledging"
                );
                return Ok(IngestOutcome {
                    event: existing,
                    enqueued: false,
                });
            }

            // Stored but not processed: a prior enqueue was lost or the job
            // is still live. Re-enqueue only when no live job exists.
            let enqueued = if self.queue.exists(&event.id).await {
                false
            } else {
                self.enqueue(&existing).await
            };
            return Ok(IngestOutcome {
                event: existing,
                enqueued,
            });
        }

        // 3. First sighting: persist, then enqueue.
        let stored = StoredEvent::received(&event, payload);
        let stored = match self.event_store.insert(&stored).await? {
            InsertOutcome::Inserted => stored,
            // A concurrent delivery won the insert race; converge on its row.
            InsertOutcome::AlreadyExists => self
                .event_store
                .find_by_provider_id(&event.id)
                .await?
                .ok_or_else(|| WebhookError::EventNotFound(event.id.clone()))?,
        };

        let enqueued = if self.queue.exists(&stored.provider_event_id).await {
            false
        } else {
            self.enqueue(&stored).await
        };

        tracing::info!(
            provider_event_id = %stored.provider_event_id,
            event_type = %stored.event_type,
            enqueued,
            "webhook event ingested"
        );

        Ok(IngestOutcome {
            event: stored,
            enqueued,
        })
    }

    /// Enqueues a job for the stored event.
    ///
    /// Enqueue failure is logged and swallowed: the event is durably stored
    /// and the provider must still get its acknowledgment. Redelivery or
    /// manual reprocessing heals the gap.
    async fn enqueue(&self, event: &StoredEvent) -> bool {
        let job = EventJob {
            event_id: event.id,
            provider_event_id: event.provider_event_id.clone(),
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            retry_count: event.retry_count,
        };
        match self.queue.enqueue(job).await {
            Ok(EnqueueOutcome::Enqueued(_)) => true,
            Ok(EnqueueOutcome::Duplicate) => false,
            Err(err) => {
                tracing::error!(
                    provider_event_id = %event.provider_event_id,
                    error = %err,
                    "failed to enqueue stored event; acknowledging anyway"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::ports::QueueError;
    use async_trait::async_trait;
    use hmac::{Hmac, Mac};
    use secrecy::SecretString;
    use sha2::Sha256;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &[u8], timestamp: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, sig)
    }

    fn event_payload(event_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "type": "invoice.payment_succeeded",
            "created": chrono::Utc::now().timestamp(),
            "data": { "object": { "id": "in_1", "customer": "cus_1" } }
        }))
        .unwrap()
    }

    fn signed_command(event_id: &str) -> IngestEventCommand {
        let payload = event_payload(event_id);
        let signature = sign(&payload, chrono::Utc::now().timestamp());
        IngestEventCommand { payload, signature }
    }

    /// Queue recording enqueued keys, optionally refusing all work.
    #[derive(Default)]
    struct RecordingQueue {
        live: Mutex<HashSet<String>>,
        enqueues: Mutex<Vec<String>>,
        closed: bool,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, job: EventJob) -> Result<EnqueueOutcome, QueueError> {
            if self.closed {
                return Err(QueueError::Closed);
            }
            let mut live = self.live.lock().unwrap();
            if live.contains(job.dedup_key()) {
                return Ok(EnqueueOutcome::Duplicate);
            }
            live.insert(job.dedup_key().to_string());
            self.enqueues
                .lock()
                .unwrap()
                .push(job.provider_event_id.clone());
            Ok(EnqueueOutcome::Enqueued(uuid::Uuid::new_v4()))
        }

        async fn exists(&self, dedup_key: &str) -> bool {
            self.live.lock().unwrap().contains(dedup_key)
        }

        async fn close(&self) {}
    }

    fn handler(
        store: Arc<InMemoryStore>,
        queue: Arc<RecordingQueue>,
    ) -> IngestEventHandler {
        IngestEventHandler::new(
            Arc::new(WebhookVerifier::new(SecretString::new(SECRET.to_string()))),
            store,
            queue,
        )
    }

    #[tokio::test]
    async fn first_delivery_stores_and_enqueues() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let handler = handler(store.clone(), queue.clone());

        let outcome = handler.handle(signed_command("evt_first")).await.unwrap();

        assert!(outcome.enqueued);
        assert_eq!(outcome.event.provider_event_id, "evt_first");
        assert!(!outcome.event.processed);
        assert_eq!(store.event_count().await, 1);
        assert_eq!(queue.enqueues.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_signature_stores_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let handler = handler(store.clone(), queue.clone());

        let payload = event_payload("evt_forged");
        let cmd = IngestEventCommand {
            payload,
            signature: format!("t={},v1={}", chrono::Utc::now().timestamp(), "0".repeat(64)),
        };

        let err = handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature));
        assert_eq!(store.event_count().await, 0);
        assert!(queue.enqueues.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_of_live_event_does_not_enqueue_again() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let handler = handler(store.clone(), queue.clone());

        let first = handler.handle(signed_command("evt_dup")).await.unwrap();
        let second = handler.handle(signed_command("evt_dup")).await.unwrap();

        assert!(first.enqueued);
        assert!(!second.enqueued);
        assert_eq!(first.event.id, second.event.id);
        assert_eq!(store.event_count().await, 1);
        assert_eq!(queue.enqueues.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stored_unprocessed_event_without_live_job_is_reenqueued() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let handler = handler(store.clone(), queue.clone());

        handler.handle(signed_command("evt_heal")).await.unwrap();
        // Simulate the job finishing without the event being processed
        // (e.g. a crash after dequeue).
        queue.live.lock().unwrap().clear();

        let outcome = handler.handle(signed_command("evt_heal")).await.unwrap();

        assert!(outcome.enqueued);
        assert_eq!(queue.enqueues.lock().unwrap().len(), 2);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn processed_event_redelivery_is_acknowledged_untouched() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let handler = handler(store.clone(), queue.clone());

        let first = handler.handle(signed_command("evt_done")).await.unwrap();
        let mut tx = (store.as_ref() as &dyn crate::ports::BillingStore)
            .begin()
            .await
            .unwrap();
        tx.mark_event_processed(first.event.id, 0).await.unwrap();
        tx.commit().await.unwrap();
        queue.live.lock().unwrap().clear();

        let second = handler.handle(signed_command("evt_done")).await.unwrap();

        assert!(!second.enqueued);
        assert!(second.event.processed);
        assert_eq!(queue.enqueues.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enqueue_failure_is_swallowed_after_store() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue {
            closed: true,
            ..Default::default()
        });
        let handler = handler(store.clone(), queue.clone());

        let outcome = handler.handle(signed_command("evt_stuck")).await.unwrap();

        // Stored but not enqueued; redelivery or reprocess heals it.
        assert!(!outcome.enqueued);
        assert_eq!(store.event_count().await, 1);
    }
}
