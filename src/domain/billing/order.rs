//! Order entity and its webhook-driven transitions.
//!
//! `paid` is the only absorbing state: a payment-failed event never
//! regresses a paid order, while a payment-succeeded event recovers an
//! order that failed earlier (failed-then-succeeded must end paid).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

/// A merchant's order, settled by an invoice payment.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub merchant_id: Uuid,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    /// Provider invoice ID once the order is linked to an invoice.
    pub provider_invoice_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// True once the order has reached a settled state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, OrderStatus::Paid | OrderStatus::Failed)
    }

    /// Links the order to the invoice that pays it.
    pub fn link_invoice(&mut self, provider_invoice_id: impl Into<String>, now: DateTime<Utc>) {
        self.provider_invoice_id = Some(provider_invoice_id.into());
        self.updated_at = now;
    }

    /// Marks the order paid. No-op if already paid; recovers from failed.
    ///
    /// Returns whether the state changed.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == OrderStatus::Paid {
            return false;
        }
        self.status = OrderStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Marks the order failed with a reason. No-op if already settled.
    ///
    /// Returns whether the state changed.
    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = OrderStatus::Failed;
        self.failed_at = Some(now);
        self.failure_reason = Some(reason.into());
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_order(amount: i64) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            amount,
            currency: "usd".to_string(),
            status: OrderStatus::Pending,
            provider_invoice_id: None,
            paid_at: None,
            failed_at: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn mark_paid_settles_pending_order() {
        let mut order = pending_order(2999);

        assert!(order.mark_paid(Utc::now()));
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.paid_at.is_some());
    }

    #[test]
    fn mark_paid_is_idempotent() {
        let mut order = pending_order(2999);
        order.mark_paid(Utc::now());
        let first_paid_at = order.paid_at;

        assert!(!order.mark_paid(Utc::now()));
        assert_eq!(order.paid_at, first_paid_at);
    }

    #[test]
    fn mark_paid_recovers_failed_order() {
        // failed is not absorbing: failed-then-succeeded ends paid
        let mut order = pending_order(2999);
        order.mark_failed("Card declined", Utc::now());

        assert!(order.mark_paid(Utc::now()));
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn mark_failed_never_regresses_paid_order() {
        let mut order = pending_order(2999);
        order.mark_paid(Utc::now());

        assert!(!order.mark_failed("Too late", Utc::now()));
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.failure_reason.is_none());
    }

    #[test]
    fn mark_failed_records_reason_and_timestamp() {
        let mut order = pending_order(2999);

        assert!(order.mark_failed("Card declined", Utc::now()));
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.failure_reason.as_deref(), Some("Card declined"));
        assert!(order.failed_at.is_some());
    }

    #[test]
    fn mark_failed_is_noop_when_already_failed() {
        let mut order = pending_order(2999);
        order.mark_failed("first", Utc::now());

        assert!(!order.mark_failed("second", Utc::now()));
        assert_eq!(order.failure_reason.as_deref(), Some("first"));
    }
}
