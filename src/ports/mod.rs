//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the pipeline and the outside world. Adapters implement these ports.
//!
//! - `WebhookEventStore` - durable, idempotent record of received events
//! - `BillingStore` / `BillingTx` - transactional domain-state access
//! - `JobQueue` / `JobHandler` - dedup-keyed work queue with retry

mod billing_store;
mod event_store;
mod job_queue;

pub use billing_store::{BillingStore, BillingTx};
pub use event_store::{EventFilter, InsertOutcome, WebhookEventStore};
pub use job_queue::{EnqueueOutcome, EventJob, JobHandler, JobQueue, QueueError};
