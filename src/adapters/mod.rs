//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the pipeline to external systems:
//! - `http` - Axum REST surface (ingestion gate plus inspection)
//! - `postgres` - durable event and billing storage
//! - `queue` - in-process job queue with a bounded worker pool
//! - `memory` - in-memory stores for tests and local development

pub mod http;
pub mod memory;
pub mod postgres;
pub mod queue;
