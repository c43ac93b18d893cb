//! Merchant entity, resolved from the provider's customer ID.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A merchant account on this platform.
///
/// Webhook processing only reads merchants; they are created and managed
/// by the platform's account surface.
#[derive(Debug, Clone)]
pub struct Merchant {
    pub id: Uuid,
    /// Provider customer ID (cus_xxx format), unique per merchant.
    pub provider_customer_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Merchant {
    pub fn new(provider_customer_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_customer_id: provider_customer_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
