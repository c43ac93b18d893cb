//! Durable record of a received webhook event.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::provider_event::ProviderEvent;

/// A webhook event as persisted by the ingestion gate.
///
/// The provider event ID is the idempotency key: at most one row exists per
/// provider event ID, ever. Once `processed` flips to true the row is never
/// mutated again except through explicit manual reprocessing.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    /// Internal ID, system-generated and immutable.
    pub id: Uuid,

    /// Provider event ID, unique and immutable.
    pub provider_event_id: String,

    /// Event type tag (e.g., "invoice.payment_succeeded").
    pub event_type: String,

    /// Full serialized event, immutable once stored.
    pub payload: serde_json::Value,

    /// Whether processing completed successfully.
    pub processed: bool,

    /// When processing completed.
    pub processed_at: Option<DateTime<Utc>>,

    /// Last processing error, overwritten on each failed attempt.
    pub last_error: Option<String>,

    /// Number of failed processing attempts so far. Never decreases.
    pub retry_count: i32,

    /// When the event was first received.
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Creates the row for a newly received, verified event.
    pub fn received(event: &ProviderEvent, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            payload,
            processed: false,
            processed_at: None,
            last_error: None,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Re-parses the stored payload into a provider event.
    pub fn provider_event(&self) -> Result<ProviderEvent, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::ProviderEventData;
    use serde_json::json;

    fn provider_event() -> ProviderEvent {
        ProviderEvent {
            id: "evt_abc".to_string(),
            event_type: "invoice.payment_succeeded".to_string(),
            created: 1704067200,
            data: ProviderEventData {
                object: json!({"id": "in_1", "customer": "cus_1"}),
            },
            livemode: false,
        }
    }

    #[test]
    fn received_event_starts_unprocessed() {
        let event = provider_event();
        let payload = serde_json::to_value(&event).unwrap();
        let stored = StoredEvent::received(&event, payload);

        assert_eq!(stored.provider_event_id, "evt_abc");
        assert_eq!(stored.event_type, "invoice.payment_succeeded");
        assert!(!stored.processed);
        assert!(stored.processed_at.is_none());
        assert!(stored.last_error.is_none());
        assert_eq!(stored.retry_count, 0);
    }

    #[test]
    fn stored_payload_round_trips_to_provider_event() {
        let event = provider_event();
        let payload = serde_json::to_value(&event).unwrap();
        let stored = StoredEvent::received(&event, payload);

        let parsed = stored.provider_event().unwrap();
        assert_eq!(parsed.id, "evt_abc");
        assert_eq!(parsed.event_type, "invoice.payment_succeeded");
    }
}
