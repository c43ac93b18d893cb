//! BillingStore port - transactional access to domain state during processing.
//!
//! The worker applies each event inside one transaction covering the
//! processed re-check, the domain mutations, and the processed flip. That
//! makes "already processed" and "apply + mark processed" mutually
//! exclusive: two concurrent deliveries of the same job cannot both mutate
//! domain state.
//!
//! The processor never creates billing entities, only updates them;
//! "not found" is a legitimate outcome, not an error.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::billing::{Merchant, Order, Subscription};
use crate::domain::webhook::{StoreError, StoredEvent};

/// Port opening processing transactions.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BillingTx>, StoreError>;
}

/// One processing transaction.
///
/// Dropped without `commit` means rolled back. Implementations backed by a
/// database take row locks on the reads so concurrent transactions over the
/// same event serialize.
#[async_trait]
pub trait BillingTx: Send {
    /// Re-reads the stored event by internal ID, locking it for the
    /// duration of the transaction.
    async fn event_for_processing(&mut self, id: Uuid) -> Result<Option<StoredEvent>, StoreError>;

    /// Flips the event to processed and records the final retry count.
    async fn mark_event_processed(
        &mut self,
        id: Uuid,
        final_retry_count: i32,
    ) -> Result<(), StoreError>;

    async fn merchant_by_customer_id(
        &mut self,
        provider_customer_id: &str,
    ) -> Result<Option<Merchant>, StoreError>;

    async fn subscription_by_provider_id(
        &mut self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    async fn update_subscription(&mut self, subscription: &Subscription)
        -> Result<(), StoreError>;

    async fn order_by_invoice_id(
        &mut self,
        provider_invoice_id: &str,
    ) -> Result<Option<Order>, StoreError>;

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Earliest-created pending order of the merchant with the exact
    /// amount and no invoice linked yet. Ties break on creation time.
    async fn oldest_pending_order(
        &mut self,
        merchant_id: Uuid,
        amount: i64,
    ) -> Result<Option<Order>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
