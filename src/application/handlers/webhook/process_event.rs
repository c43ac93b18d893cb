//! ProcessEventHandler - applies a dequeued event to domain state.
//!
//! Each delivery runs inside one transaction covering the processed
//! re-check, the domain mutations, and the processed flip, so duplicate or
//! concurrent deliveries of the same event can never double-apply. A failed
//! attempt rolls the transaction back and records the error on the stored
//! event through a separate non-transactional write, then propagates the
//! error so the queue schedules the retry.
//!
//! Processing only updates existing domain entities. Events referencing
//! merchants, subscriptions, or orders this platform does not know are
//! logged and completed, not retried: they would fail identically forever.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::billing::SubscriptionStatus;
use crate::domain::webhook::{
    EventKind, InvoicePayload, ProcessingError, SubscriptionPayload,
};
use crate::ports::{BillingStore, BillingTx, EventJob, JobHandler, WebhookEventStore};

/// Converts a provider Unix timestamp, tolerating out-of-range values.
fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Handler processing queued webhook events.
pub struct ProcessEventHandler {
    billing: Arc<dyn BillingStore>,
    event_store: Arc<dyn WebhookEventStore>,
}

impl ProcessEventHandler {
    pub fn new(billing: Arc<dyn BillingStore>, event_store: Arc<dyn WebhookEventStore>) -> Self {
        Self {
            billing,
            event_store,
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn BillingTx,
        job: &EventJob,
        attempt: u32,
    ) -> Result<(), ProcessingError> {
        // Re-read under lock; the row may have been processed by another
        // delivery between enqueue and now.
        let stored = match tx.event_for_processing(job.event_id).await? {
            Some(stored) => stored,
            None => {
                tracing::warn!(
                    event_id = %job.event_id,
                    provider_event_id = %job.provider_event_id,
                    "queued event no longer exists, completing job"
                );
                return Ok(());
            }
        };

        if stored.processed {
            tracing::debug!(
                provider_event_id = %stored.provider_event_id,
                "event already processed, completing job"
            );
            return Ok(());
        }

        let event = stored
            .provider_event()
            .map_err(|e| ProcessingError::Payload(e.to_string()))?;
        let kind = event
            .kind()
            .map_err(|e| ProcessingError::Payload(e.to_string()))?;

        let now = Utc::now();
        match kind {
            EventKind::PaymentSucceeded(invoice) => {
                self.handle_payment_succeeded(tx, &invoice, now).await?;
            }
            EventKind::PaymentFailed(invoice) => {
                self.handle_payment_failed(tx, &invoice, now).await?;
            }
            EventKind::SubscriptionUpdated(sub) => {
                self.handle_subscription_updated(tx, &sub, now).await?;
            }
            EventKind::SubscriptionDeleted(sub) => {
                self.handle_subscription_deleted(tx, &sub, now).await?;
            }
            EventKind::Unrecognized(event_type) => {
                tracing::info!(
                    provider_event_id = %stored.provider_event_id,
                    event_type = %event_type,
                    "unrecognized event type, completing without domain changes"
                );
            }
        }

        // Final retry count: failures recorded before this job plus the
        // failed attempts of this job itself.
        let final_retry_count = job.retry_count + (attempt as i32 - 1);
        tx.mark_event_processed(job.event_id, final_retry_count)
            .await?;

        tracing::info!(
            provider_event_id = %stored.provider_event_id,
            event_type = %stored.event_type,
            attempt,
            "event processed"
        );
        Ok(())
    }

    async fn handle_payment_succeeded(
        &self,
        tx: &mut dyn BillingTx,
        invoice: &InvoicePayload,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessingError> {
        let merchant = match tx.merchant_by_customer_id(&invoice.customer).await? {
            Some(merchant) => merchant,
            None => {
                // Permanently unresolvable: no merchant will appear later
                // for this customer ID. Complete instead of retrying.
                tracing::warn!(
                    provider_customer_id = %invoice.customer,
                    provider_invoice_id = %invoice.id,
                    "payment succeeded for unknown customer, skipping"
                );
                return Ok(());
            }
        };

        if let Some(sub_id) = invoice.subscription.as_deref() {
            if let Some(mut subscription) = tx.subscription_by_provider_id(sub_id).await? {
                subscription.mark_active(
                    invoice.period_start.and_then(from_unix),
                    invoice.period_end.and_then(from_unix),
                    now,
                );
                tx.update_subscription(&subscription).await?;
            } else {
                tracing::warn!(
                    provider_subscription_id = %sub_id,
                    "paid invoice references unknown subscription"
                );
            }
        }

        // Settle the order: by linked invoice first, else by amount match
        // against the merchant's earliest pending order.
        if let Some(mut order) = tx.order_by_invoice_id(&invoice.id).await? {
            if order.mark_paid(now) {
                tx.update_order(&order).await?;
            }
        } else if let Some(mut order) = tx
            .oldest_pending_order(merchant.id, invoice.amount_paid)
            .await?
        {
            order.link_invoice(&invoice.id, now);
            order.mark_paid(now);
            tx.update_order(&order).await?;
        } else {
            tracing::debug!(
                merchant_id = %merchant.id,
                provider_invoice_id = %invoice.id,
                amount_paid = invoice.amount_paid,
                "no matching order for paid invoice"
            );
        }

        Ok(())
    }

    async fn handle_payment_failed(
        &self,
        tx: &mut dyn BillingTx,
        invoice: &InvoicePayload,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessingError> {
        // Merchant resolution is advisory here; subscription and order are
        // addressed by their own provider IDs.
        if tx.merchant_by_customer_id(&invoice.customer).await?.is_none() {
            tracing::warn!(
                provider_customer_id = %invoice.customer,
                provider_invoice_id = %invoice.id,
                "payment failed for unknown customer"
            );
        }

        let reason = invoice.failure_reason();

        if let Some(sub_id) = invoice.subscription.as_deref() {
            if let Some(mut subscription) = tx.subscription_by_provider_id(sub_id).await? {
                subscription.mark_past_due(now);
                tx.update_subscription(&subscription).await?;
            }
        }

        if let Some(mut order) = tx.order_by_invoice_id(&invoice.id).await? {
            // Terminal orders are protected: a late failure never regresses
            // a paid order.
            if order.mark_failed(&reason, now) {
                tx.update_order(&order).await?;
            }
        }

        Ok(())
    }

    async fn handle_subscription_updated(
        &self,
        tx: &mut dyn BillingTx,
        payload: &SubscriptionPayload,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessingError> {
        let Some(mut subscription) = tx.subscription_by_provider_id(&payload.id).await? else {
            tracing::warn!(
                provider_subscription_id = %payload.id,
                "update for unknown subscription, skipping"
            );
            return Ok(());
        };

        match SubscriptionStatus::from_provider(&payload.status) {
            Some(status) => {
                subscription.sync(
                    status,
                    payload.current_period_start.and_then(from_unix),
                    payload.current_period_end.and_then(from_unix),
                    payload.cancel_at_period_end,
                    payload.canceled_at.and_then(from_unix),
                    now,
                );
                tx.update_subscription(&subscription).await?;
            }
            None => {
                // Unknown vocabulary: keep the prior local status rather
                // than guessing.
                tracing::warn!(
                    provider_subscription_id = %payload.id,
                    status = %payload.status,
                    "unknown subscription status, keeping local state"
                );
            }
        }

        Ok(())
    }

    async fn handle_subscription_deleted(
        &self,
        tx: &mut dyn BillingTx,
        payload: &SubscriptionPayload,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessingError> {
        let Some(mut subscription) = tx.subscription_by_provider_id(&payload.id).await? else {
            tracing::warn!(
                provider_subscription_id = %payload.id,
                "deletion for unknown subscription, skipping"
            );
            return Ok(());
        };

        subscription.cancel(now);
        tx.update_subscription(&subscription).await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ProcessEventHandler {
    async fn process(&self, job: &EventJob, attempt: u32) -> Result<(), ProcessingError> {
        let mut tx = self.billing.begin().await?;

        match self.apply(tx.as_mut(), job, attempt).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rb_err) = tx.rollback().await {
                    tracing::error!(
                        event_id = %job.event_id,
                        error = %rb_err,
                        "rollback failed after processing error"
                    );
                }
                // Outside the rolled-back transaction, so the error record
                // survives.
                if let Err(rec_err) = self
                    .event_store
                    .record_failure(job.event_id, &err.to_string())
                    .await
                {
                    tracing::error!(
                        event_id = %job.event_id,
                        error = %rec_err,
                        "failed to record processing error"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::billing::{Merchant, Order, OrderStatus, Subscription};
    use crate::domain::webhook::{ProviderEvent, StoredEvent};
    use serde_json::json;
    use uuid::Uuid;

    fn stored_event(event_id: &str, event_type: &str, object: serde_json::Value) -> StoredEvent {
        let payload = json!({
            "id": event_id,
            "type": event_type,
            "created": Utc::now().timestamp(),
            "data": { "object": object }
        });
        let event: ProviderEvent = serde_json::from_value(payload.clone()).unwrap();
        StoredEvent::received(&event, payload)
    }

    fn job_for(stored: &StoredEvent) -> EventJob {
        EventJob {
            event_id: stored.id,
            provider_event_id: stored.provider_event_id.clone(),
            event_type: stored.event_type.clone(),
            payload: stored.payload.clone(),
            retry_count: stored.retry_count,
        }
    }

    fn pending_order(merchant_id: Uuid, amount: i64) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            merchant_id,
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

    fn subscription(merchant_id: Uuid, provider_id: &str) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            merchant_id,
            provider_subscription_id: provider_id.to_string(),
            status: crate::domain::billing::SubscriptionStatus::Active,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> (Arc<InMemoryStore>, ProcessEventHandler) {
        let store = Arc::new(InMemoryStore::new());
        let handler = ProcessEventHandler::new(store.clone(), store.clone());
        (store, handler)
    }

    #[tokio::test]
    async fn payment_succeeded_settles_linked_order_and_activates_subscription() {
        let (store, handler) = setup().await;
        let merchant = Merchant::new("cus_1", "Acme");
        let sub = subscription(merchant.id, "sub_1");
        let sub_id = sub.id;
        let mut order = pending_order(merchant.id, 2999);
        order.provider_invoice_id = Some("in_1".to_string());
        let order_id = order.id;
        store.seed_merchant(merchant).await;
        store.seed_subscription(sub).await;
        store.seed_order(order).await;

        let stored = stored_event(
            "evt_ok",
            "invoice.payment_succeeded",
            json!({
                "id": "in_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "amount_paid": 2999,
                "period_end": Utc::now().timestamp() + 86_400
            }),
        );
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let order = store.order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        let sub = store.subscription(sub_id).await.unwrap();
        assert_eq!(sub.status, crate::domain::billing::SubscriptionStatus::Active);
        assert!(sub.current_period_end.is_some());

        let event = store.find_by_id(stored.id).await.unwrap().unwrap();
        assert!(event.processed);
        assert_eq!(event.retry_count, 0);
    }

    #[tokio::test]
    async fn payment_succeeded_links_oldest_pending_order_by_amount() {
        let (store, handler) = setup().await;
        let merchant = Merchant::new("cus_1", "Acme");
        let merchant_id = merchant.id;
        store.seed_merchant(merchant).await;

        let mut older = pending_order(merchant_id, 5000);
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        let older_id = older.id;
        let newer = pending_order(merchant_id, 5000);
        let newer_id = newer.id;
        store.seed_order(older).await;
        store.seed_order(newer).await;

        let stored = stored_event(
            "evt_amount",
            "invoice.payment_succeeded",
            json!({ "id": "in_9", "customer": "cus_1", "amount_paid": 5000 }),
        );
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let settled = store.order(older_id).await.unwrap();
        assert_eq!(settled.status, OrderStatus::Paid);
        assert_eq!(settled.provider_invoice_id.as_deref(), Some("in_9"));
        let untouched = store.order(newer_id).await.unwrap();
        assert_eq!(untouched.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn payment_succeeded_for_unknown_customer_completes_without_changes() {
        let (store, handler) = setup().await;
        let stored = stored_event(
            "evt_ghost",
            "invoice.payment_succeeded",
            json!({ "id": "in_1", "customer": "cus_nobody", "amount_paid": 100 }),
        );
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let event = store.find_by_id(stored.id).await.unwrap().unwrap();
        assert!(event.processed);
        assert!(event.last_error.is_none());
    }

    #[tokio::test]
    async fn payment_failed_marks_order_and_subscription() {
        let (store, handler) = setup().await;
        let merchant = Merchant::new("cus_1", "Acme");
        let sub = subscription(merchant.id, "sub_1");
        let sub_id = sub.id;
        let mut order = pending_order(merchant.id, 2999);
        order.provider_invoice_id = Some("in_1".to_string());
        let order_id = order.id;
        store.seed_merchant(merchant).await;
        store.seed_subscription(sub).await;
        store.seed_order(order).await;

        let stored = stored_event(
            "evt_fail",
            "invoice.payment_failed",
            json!({
                "id": "in_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "amount_due": 2999,
                "charge_failure_message": "Card declined"
            }),
        );
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let order = store.order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.failure_reason.as_deref(), Some("Card declined"));
        let sub = store.subscription(sub_id).await.unwrap();
        assert_eq!(
            sub.status,
            crate::domain::billing::SubscriptionStatus::PastDue
        );
    }

    #[tokio::test]
    async fn late_failure_never_regresses_paid_order() {
        let (store, handler) = setup().await;
        let merchant = Merchant::new("cus_1", "Acme");
        let mut order = pending_order(merchant.id, 2999);
        order.provider_invoice_id = Some("in_1".to_string());
        order.mark_paid(Utc::now());
        let order_id = order.id;
        store.seed_merchant(merchant).await;
        store.seed_order(order).await;

        let stored = stored_event(
            "evt_late_fail",
            "invoice.payment_failed",
            json!({ "id": "in_1", "customer": "cus_1", "amount_due": 2999 }),
        );
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let order = store.order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn subscription_updated_syncs_authoritative_state() {
        let (store, handler) = setup().await;
        let merchant = Merchant::new("cus_1", "Acme");
        let sub = subscription(merchant.id, "sub_1");
        let sub_id = sub.id;
        store.seed_merchant(merchant).await;
        store.seed_subscription(sub).await;

        let stored = stored_event(
            "evt_sync",
            "customer.subscription.updated",
            json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "unpaid",
                "cancel_at_period_end": true
            }),
        );
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let sub = store.subscription(sub_id).await.unwrap();
        assert_eq!(sub.status, crate::domain::billing::SubscriptionStatus::Unpaid);
        assert!(sub.cancel_at_period_end);
    }

    #[tokio::test]
    async fn subscription_updated_with_unknown_status_keeps_local_state() {
        let (store, handler) = setup().await;
        let merchant = Merchant::new("cus_1", "Acme");
        let sub = subscription(merchant.id, "sub_1");
        let sub_id = sub.id;
        store.seed_merchant(merchant).await;
        store.seed_subscription(sub).await;

        let stored = stored_event(
            "evt_weird",
            "customer.subscription.updated",
            json!({ "id": "sub_1", "status": "hibernating" }),
        );
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let sub = store.subscription(sub_id).await.unwrap();
        assert_eq!(sub.status, crate::domain::billing::SubscriptionStatus::Active);
        let event = store.find_by_id(stored.id).await.unwrap().unwrap();
        assert!(event.processed);
    }

    #[tokio::test]
    async fn subscription_deleted_cancels_subscription() {
        let (store, handler) = setup().await;
        let merchant = Merchant::new("cus_1", "Acme");
        let sub = subscription(merchant.id, "sub_1");
        let sub_id = sub.id;
        store.seed_merchant(merchant).await;
        store.seed_subscription(sub).await;

        let stored = stored_event(
            "evt_del",
            "customer.subscription.deleted",
            json!({ "id": "sub_1", "status": "canceled" }),
        );
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let sub = store.subscription(sub_id).await.unwrap();
        assert_eq!(
            sub.status,
            crate::domain::billing::SubscriptionStatus::Canceled
        );
        assert!(sub.canceled_at.is_some());
    }

    #[tokio::test]
    async fn unrecognized_event_type_completes_without_changes() {
        let (store, handler) = setup().await;
        let stored = stored_event("evt_other", "charge.refunded", json!({ "id": "ch_1" }));
        store.insert(&stored).await.unwrap();

        handler.process(&job_for(&stored), 1).await.unwrap();

        let event = store.find_by_id(stored.id).await.unwrap().unwrap();
        assert!(event.processed);
    }

    #[tokio::test]
    async fn already_processed_event_is_completed_without_reapplying() {
        let (store, handler) = setup().await;
        let merchant = Merchant::new("cus_1", "Acme");
        let mut order = pending_order(merchant.id, 2999);
        order.provider_invoice_id = Some("in_1".to_string());
        let order_id = order.id;
        store.seed_merchant(merchant).await;
        store.seed_order(order).await;

        let stored = stored_event(
            "evt_twice",
            "invoice.payment_succeeded",
            json!({ "id": "in_1", "customer": "cus_1", "amount_paid": 2999 }),
        );
        store.insert(&stored).await.unwrap();
        let job = job_for(&stored);

        handler.process(&job, 1).await.unwrap();
        let first_paid_at = store.order(order_id).await.unwrap().paid_at;

        handler.process(&job, 1).await.unwrap();
        assert_eq!(store.order(order_id).await.unwrap().paid_at, first_paid_at);
    }

    #[tokio::test]
    async fn malformed_payload_rolls_back_and_records_error() {
        let (store, handler) = setup().await;
        // recognized type with a data object missing required fields
        let stored = stored_event(
            "evt_bad",
            "invoice.payment_succeeded",
            json!({ "customer_only": true }),
        );
        store.insert(&stored).await.unwrap();

        let err = handler.process(&job_for(&stored), 1).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Payload(_)));

        let event = store.find_by_id(stored.id).await.unwrap().unwrap();
        assert!(!event.processed);
        assert_eq!(event.retry_count, 1);
        assert!(event.last_error.is_some());
    }

    #[tokio::test]
    async fn final_retry_count_accumulates_prior_failures_and_attempts() {
        let (store, handler) = setup().await;
        let mut stored = stored_event("evt_retry", "charge.refunded", json!({}));
        stored.retry_count = 2;
        store.insert(&stored).await.unwrap();

        let job = job_for(&stored);
        // Third attempt of this job, on top of two recorded failures.
        handler.process(&job, 3).await.unwrap();

        let event = store.find_by_id(stored.id).await.unwrap().unwrap();
        assert!(event.processed);
        assert_eq!(event.retry_count, 4);
    }

    #[tokio::test]
    async fn missing_stored_event_completes_job() {
        let (_store, handler) = setup().await;
        let job = EventJob {
            event_id: Uuid::new_v4(),
            provider_event_id: "evt_gone".to_string(),
            event_type: "invoice.payment_succeeded".to_string(),
            payload: json!({}),
            retry_count: 0,
        };

        handler.process(&job, 1).await.unwrap();
    }
}
