//! Payment-provider webhook event types.
//!
//! `ProviderEvent` is the canonical envelope parsed from a verified payload.
//! `EventKind` is the closed set of transitions the processor understands;
//! anything else decodes into `Unrecognized` so new provider event types
//! never block queue progress.

use serde::{Deserialize, Serialize};

/// Provider webhook event envelope (simplified).
///
/// Only the fields relevant to processing are captured; the rest of the
/// provider's schema is ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEvent {
    /// Unique identifier for the event (evt_xxx format). The idempotency key.
    pub id: String,

    /// Type of event (e.g., "invoice.payment_succeeded").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the event was created (Unix timestamp).
    pub created: i64,

    /// Object containing event-specific data.
    pub data: ProviderEventData,

    /// Whether this is a live mode event (vs test mode).
    #[serde(default)]
    pub livemode: bool,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEventData {
    /// The object that triggered the event (polymorphic based on event type).
    pub object: serde_json::Value,
}

/// The recognized event transitions, plus a catch-all for everything else.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// An invoice was paid.
    PaymentSucceeded(InvoicePayload),
    /// An invoice payment attempt failed.
    PaymentFailed(InvoicePayload),
    /// Authoritative subscription state sync from the provider.
    SubscriptionUpdated(SubscriptionPayload),
    /// The subscription was deleted on the provider side.
    SubscriptionDeleted(SubscriptionPayload),
    /// An event type this service does not handle.
    Unrecognized(String),
}

impl ProviderEvent {
    /// Decodes the event into its recognized kind.
    ///
    /// # Errors
    ///
    /// Fails only when a recognized event type carries a data object that
    /// does not match its expected shape.
    pub fn kind(&self) -> Result<EventKind, serde_json::Error> {
        Ok(match self.event_type.as_str() {
            "invoice.payment_succeeded" => EventKind::PaymentSucceeded(self.object()?),
            "invoice.payment_failed" => EventKind::PaymentFailed(self.object()?),
            "customer.subscription.updated" => EventKind::SubscriptionUpdated(self.object()?),
            "customer.subscription.deleted" => EventKind::SubscriptionDeleted(self.object()?),
            other => EventKind::Unrecognized(other.to_string()),
        })
    }

    fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// Invoice fields carried by payment-succeeded and payment-failed events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvoicePayload {
    /// Provider invoice ID (in_xxx format).
    pub id: String,

    /// Provider customer ID, resolved to a local merchant.
    pub customer: String,

    /// Provider subscription ID, when the invoice belongs to a subscription.
    #[serde(default)]
    pub subscription: Option<String>,

    /// Amount actually paid, in the smallest currency unit.
    #[serde(default)]
    pub amount_paid: i64,

    /// Amount due, in the smallest currency unit.
    #[serde(default)]
    pub amount_due: i64,

    /// ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,

    /// Billing period start (Unix timestamp), when present.
    #[serde(default)]
    pub period_start: Option<i64>,

    /// Billing period end (Unix timestamp), when present.
    #[serde(default)]
    pub period_end: Option<i64>,

    /// Error from invoice finalization, when the payment failed there.
    #[serde(default)]
    pub last_finalization_error: Option<FinalizationError>,

    /// Failure message from the underlying charge, when available.
    #[serde(default)]
    pub charge_failure_message: Option<String>,
}

/// Finalization error details attached to a failed invoice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinalizationError {
    #[serde(default)]
    pub message: Option<String>,
}

impl InvoicePayload {
    /// Extracts a human-readable failure reason.
    ///
    /// First non-empty of: finalization error message, charge failure
    /// message, else a generic default.
    pub fn failure_reason(&self) -> String {
        if let Some(msg) = self
            .last_finalization_error
            .as_ref()
            .and_then(|e| e.message.as_deref())
        {
            if !msg.is_empty() {
                return msg.to_string();
            }
        }
        if let Some(msg) = self.charge_failure_message.as_deref() {
            if !msg.is_empty() {
                return msg.to_string();
            }
        }
        "Payment failed".to_string()
    }
}

/// Subscription fields carried by subscription-updated and -deleted events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionPayload {
    /// Provider subscription ID (sub_xxx format).
    pub id: String,

    /// Provider customer ID.
    #[serde(default)]
    pub customer: Option<String>,

    /// Provider-reported subscription status (e.g., "active", "past_due").
    pub status: String,

    /// Current billing period start (Unix timestamp), when present.
    #[serde(default)]
    pub current_period_start: Option<i64>,

    /// Current billing period end (Unix timestamp), when present.
    #[serde(default)]
    pub current_period_end: Option<i64>,

    /// Whether the subscription cancels at period end.
    #[serde(default)]
    pub cancel_at_period_end: Option<bool>,

    /// Cancellation timestamp (Unix), when the subscription was canceled.
    #[serde(default)]
    pub canceled_at: Option<i64>,
}
