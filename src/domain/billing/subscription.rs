//! Subscription entity and its webhook-driven transitions.
//!
//! Transitions are idempotent and order-tolerant: events may arrive in any
//! order, and a subscription-updated event is the authoritative state sync
//! that always wins over prior local status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription status, mirroring the provider's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Parses a provider-reported status string.
    ///
    /// Returns `None` for vocabulary this service does not know; callers
    /// keep the prior local status in that case.
    pub fn from_provider(s: &str) -> Option<Self> {
        match s {
            "incomplete" => Some(Self::Incomplete),
            "trialing" => Some(Self::Trialing),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            "unpaid" => Some(Self::Unpaid),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
        }
    }
}

/// A merchant's subscription with the payment provider.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub merchant_id: Uuid,
    /// Provider subscription ID (sub_xxx format), unique.
    pub provider_subscription_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Marks the subscription active after a successful payment.
    ///
    /// Period bounds present in the event take precedence; absent values
    /// leave prior bounds untouched.
    pub fn mark_active(
        &mut self,
        period_start: Option<DateTime<Utc>>,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        self.status = SubscriptionStatus::Active;
        if period_start.is_some() {
            self.current_period_start = period_start;
        }
        if period_end.is_some() {
            self.current_period_end = period_end;
        }
        self.updated_at = now;
    }

    /// Marks the subscription past due after a failed payment.
    pub fn mark_past_due(&mut self, now: DateTime<Utc>) {
        self.status = SubscriptionStatus::PastDue;
        self.updated_at = now;
    }

    /// Applies an authoritative state sync from a subscription-updated event.
    ///
    /// The reported status unconditionally overwrites the local one; the
    /// remaining fields are refreshed from whatever values are present.
    pub fn sync(
        &mut self,
        status: SubscriptionStatus,
        period_start: Option<DateTime<Utc>>,
        period_end: Option<DateTime<Utc>>,
        cancel_at_period_end: Option<bool>,
        canceled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        if period_start.is_some() {
            self.current_period_start = period_start;
        }
        if period_end.is_some() {
            self.current_period_end = period_end;
        }
        if let Some(flag) = cancel_at_period_end {
            self.cancel_at_period_end = flag;
        }
        if canceled_at.is_some() {
            self.canceled_at = canceled_at;
        }
        self.updated_at = now;
    }

    /// Cancels the subscription in response to a subscription-deleted event.
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = SubscriptionStatus::Canceled;
        self.canceled_at = Some(now);
        self.updated_at = now;
    }
}
