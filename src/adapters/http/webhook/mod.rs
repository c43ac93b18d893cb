//! HTTP adapter for the webhook pipeline.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{WebhookApiError, WebhookAppState, SIGNATURE_HEADER};
pub use routes::webhook_router;
