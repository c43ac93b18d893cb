//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `webhook` - Verified provider events, stored event records, signature
//!   verification, and the pipeline error taxonomy
//! - `billing` - Merchant, subscription, and order entities mutated by
//!   event processing

pub mod billing;
pub mod webhook;
