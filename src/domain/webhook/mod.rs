//! Webhook pipeline domain: verified events, their durable records, and
//! the error taxonomy of the ingestion/processing path.

mod errors;
mod provider_event;
mod stored_event;
mod verifier;

pub use errors::{ProcessingError, StoreError, WebhookError};
pub use provider_event::{
    EventKind, FinalizationError, InvoicePayload, ProviderEvent, ProviderEventData,
    SubscriptionPayload,
};
pub use stored_event::StoredEvent;
pub use verifier::{SignatureHeader, WebhookVerifier};
