//! PostgreSQL adapters - Database implementations for the storage ports.
//!
//! - `PostgresEventStore` - durable webhook event record
//! - `PostgresBillingStore` - transactional billing-state access

mod billing_store;
mod event_store;

pub use billing_store::PostgresBillingStore;
pub use event_store::PostgresEventStore;
