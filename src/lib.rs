//! Billhook - Payment-provider webhook ingestion and processing pipeline
//!
//! Receives signed webhook deliveries, records them durably and
//! idempotently, and applies them to billing state through an asynchronous
//! worker pool with retry and backoff.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
