//! In-memory store implementing both storage ports.
//!
//! Backs the integration tests and local development without Postgres.
//! All state lives behind one async mutex; a "transaction" takes the lock
//! for its whole lifetime and works on a staged clone, so commit/rollback
//! and the serialization of concurrent processors behave like the
//! database-backed adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::billing::{Merchant, Order, OrderStatus, Subscription};
use crate::domain::webhook::{StoreError, StoredEvent};
use crate::ports::{BillingStore, BillingTx, EventFilter, InsertOutcome, WebhookEventStore};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    events: HashMap<Uuid, StoredEvent>,
    events_by_provider_id: HashMap<String, Uuid>,
    merchants: HashMap<Uuid, Merchant>,
    subscriptions: HashMap<Uuid, Subscription>,
    orders: HashMap<Uuid, Order>,
}

/// In-memory implementation of `WebhookEventStore` and `BillingStore`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seed and inspection helpers for tests ──

    pub async fn seed_merchant(&self, merchant: Merchant) {
        let mut state = self.state.lock().await;
        state.merchants.insert(merchant.id, merchant);
    }

    pub async fn seed_subscription(&self, subscription: Subscription) {
        let mut state = self.state.lock().await;
        state.subscriptions.insert(subscription.id, subscription);
    }

    pub async fn seed_order(&self, order: Order) {
        let mut state = self.state.lock().await;
        state.orders.insert(order.id, order);
    }

    pub async fn subscription(&self, id: Uuid) -> Option<Subscription> {
        let state = self.state.lock().await;
        state.subscriptions.get(&id).cloned()
    }

    pub async fn order(&self, id: Uuid) -> Option<Order> {
        let state = self.state.lock().await;
        state.orders.get(&id).cloned()
    }

    pub async fn event_count(&self) -> usize {
        let state = self.state.lock().await;
        state.events.len()
    }
}

#[async_trait]
impl WebhookEventStore for InMemoryStore {
    async fn insert(&self, event: &StoredEvent) -> Result<InsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        if state
            .events_by_provider_id
            .contains_key(&event.provider_event_id)
        {
            return Ok(InsertOutcome::AlreadyExists);
        }
        state
            .events_by_provider_id
            .insert(event.provider_event_id.clone(), event.id);
        state.events.insert(event.id, event.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_by_provider_id(
        &self,
        provider_event_id: &str,
    ) -> Result<Option<StoredEvent>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .events_by_provider_id
            .get(provider_event_id)
            .and_then(|id| state.events.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredEvent>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.events.get(&id).cloned())
    }

    async fn list(&self, filter: EventFilter) -> Result<Vec<StoredEvent>, StoreError> {
        let state = self.state.lock().await;
        let mut events: Vec<StoredEvent> = state
            .events
            .values()
            .filter(|event| {
                filter
                    .processed
                    .map_or(true, |wanted| event.processed == wanted)
            })
            .filter(|event| {
                filter
                    .event_type
                    .as_deref()
                    .map_or(true, |wanted| event.event_type == wanted)
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(filter.limit as usize);
        Ok(events)
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.events.get_mut(&id) {
            event.last_error = Some(error.to_string());
            event.retry_count += 1;
        }
        Ok(())
    }

    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let doomed: Vec<Uuid> = state
            .events
            .values()
            .filter(|event| event.processed && event.created_at < cutoff)
            .map(|event| event.id)
            .collect();
        for id in &doomed {
            if let Some(event) = state.events.remove(id) {
                state.events_by_provider_id.remove(&event.provider_event_id);
            }
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn BillingTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryBillingTx { guard, staged }))
    }
}

/// Transaction over the in-memory state.
///
/// Holds the store lock for its lifetime, which serializes concurrent
/// transactions the way row locks do in the database adapter. Mutations go
/// to the staged clone and only become visible on commit.
struct InMemoryBillingTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl BillingTx for InMemoryBillingTx {
    async fn event_for_processing(&mut self, id: Uuid) -> Result<Option<StoredEvent>, StoreError> {
        Ok(self.staged.events.get(&id).cloned())
    }

    async fn mark_event_processed(
        &mut self,
        id: Uuid,
        final_retry_count: i32,
    ) -> Result<(), StoreError> {
        if let Some(event) = self.staged.events.get_mut(&id) {
            event.processed = true;
            event.processed_at = Some(Utc::now());
            event.retry_count = final_retry_count;
        }
        Ok(())
    }

    async fn merchant_by_customer_id(
        &mut self,
        provider_customer_id: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        Ok(self
            .staged
            .merchants
            .values()
            .find(|m| m.provider_customer_id == provider_customer_id)
            .cloned())
    }

    async fn subscription_by_provider_id(
        &mut self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .staged
            .subscriptions
            .values()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned())
    }

    async fn update_subscription(
        &mut self,
        subscription: &Subscription,
    ) -> Result<(), StoreError> {
        self.staged
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn order_by_invoice_id(
        &mut self,
        provider_invoice_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .staged
            .orders
            .values()
            .find(|o| o.provider_invoice_id.as_deref() == Some(provider_invoice_id))
            .cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn oldest_pending_order(
        &mut self,
        merchant_id: Uuid,
        amount: i64,
    ) -> Result<Option<Order>, StoreError> {
        let mut candidates: Vec<&Order> = self
            .staged
            .orders
            .values()
            .filter(|o| {
                o.merchant_id == merchant_id
                    && o.amount == amount
                    && o.status == OrderStatus::Pending
                    && o.provider_invoice_id.is_none()
            })
            .collect();
        candidates.sort_by_key(|o| o.created_at);
        Ok(candidates.first().map(|o| (*o).clone()))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = self.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::ProviderEvent;
    use serde_json::json;

    fn stored_event(provider_event_id: &str) -> StoredEvent {
        let payload = json!({
            "id": provider_event_id,
            "type": "invoice.payment_succeeded",
            "created": 1_700_000_000,
            "data": { "object": {} }
        });
        let event: ProviderEvent = serde_json::from_value(payload.clone()).unwrap();
        StoredEvent::received(&event, payload)
    }

    #[tokio::test]
    async fn insert_is_idempotent_on_provider_event_id() {
        let store = InMemoryStore::new();
        let event = stored_event("evt_1");

        assert_eq!(store.insert(&event).await.unwrap(), InsertOutcome::Inserted);

        let mut duplicate = stored_event("evt_1");
        duplicate.id = Uuid::new_v4();
        assert_eq!(
            store.insert(&duplicate).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn record_failure_increments_retry_and_overwrites_error() {
        let store = InMemoryStore::new();
        let event = stored_event("evt_fail");
        store.insert(&event).await.unwrap();

        store.record_failure(event.id, "first").await.unwrap();
        store.record_failure(event.id, "second").await.unwrap();

        let stored = store.find_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 2);
        assert_eq!(stored.last_error.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn rollback_discards_staged_mutations() {
        let store = InMemoryStore::new();
        let event = stored_event("evt_rb");
        store.insert(&event).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.mark_event_processed(event.id, 0).await.unwrap();
        tx.rollback().await.unwrap();

        let stored = store.find_by_id(event.id).await.unwrap().unwrap();
        assert!(!stored.processed);
    }

    #[tokio::test]
    async fn commit_publishes_staged_mutations() {
        let store = InMemoryStore::new();
        let event = stored_event("evt_commit");
        store.insert(&event).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.mark_event_processed(event.id, 2).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.find_by_id(event.id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert!(stored.processed_at.is_some());
        assert_eq!(stored.retry_count, 2);
    }

    #[tokio::test]
    async fn oldest_pending_order_prefers_earliest_created() {
        let store = InMemoryStore::new();
        let merchant = Merchant::new("cus_1", "Acme");
        let merchant_id = merchant.id;
        store.seed_merchant(merchant).await;

        let now = Utc::now();
        let older = Order {
            id: Uuid::new_v4(),
            merchant_id,
            amount: 5000,
            currency: "usd".to_string(),
            status: OrderStatus::Pending,
            provider_invoice_id: None,
            paid_at: None,
            failed_at: None,
            failure_reason: None,
            created_at: now - chrono::Duration::hours(2),
            updated_at: now,
        };
        let newer = Order {
            id: Uuid::new_v4(),
            created_at: now - chrono::Duration::hours(1),
            ..older.clone()
        };
        store.seed_order(older.clone()).await;
        store.seed_order(newer).await;

        let mut tx = store.begin().await.unwrap();
        let found = tx.oldest_pending_order(merchant_id, 5000).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(found.map(|o| o.id), Some(older.id));
    }

    #[tokio::test]
    async fn list_filters_by_processed_and_type() {
        let store = InMemoryStore::new();
        let event = stored_event("evt_list");
        store.insert(&event).await.unwrap();

        let hits = store
            .list(EventFilter {
                processed: Some(false),
                event_type: Some("invoice.payment_succeeded".to_string()),
                limit: 50,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store
            .list(EventFilter {
                processed: Some(true),
                event_type: None,
                limit: 50,
            })
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn retention_sweep_removes_only_old_processed_events() {
        let store = InMemoryStore::new();
        let mut old_processed = stored_event("evt_old");
        old_processed.processed = true;
        old_processed.created_at = Utc::now() - chrono::Duration::days(40);
        let fresh = stored_event("evt_fresh");
        store.insert(&old_processed).await.unwrap();
        store.insert(&fresh).await.unwrap();

        let removed = store
            .delete_processed_before(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store
            .find_by_provider_id("evt_old")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_provider_id("evt_fresh")
            .await
            .unwrap()
            .is_some());
    }
}
