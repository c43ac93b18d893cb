//! PostgreSQL implementation of BillingStore and BillingTx.
//!
//! Each processing transaction takes `FOR UPDATE` row locks on the stored
//! event and on the order it settles, so concurrent deliveries of the same
//! event serialize at the database and the second one observes
//! `processed = TRUE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{Merchant, Order, OrderStatus, Subscription, SubscriptionStatus};
use crate::domain::webhook::{StoreError, StoredEvent};
use crate::ports::{BillingStore, BillingTx};

use super::event_store::{EventRow, SELECT_EVENT};

/// PostgreSQL implementation of the BillingStore port.
pub struct PostgresBillingStore {
    pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::database)?;
        Ok(Box::new(PostgresBillingTx { tx }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MerchantRow {
    id: Uuid,
    provider_customer_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<MerchantRow> for Merchant {
    fn from(row: MerchantRow) -> Self {
        Merchant {
            id: row.id,
            provider_customer_id: row.provider_customer_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    merchant_id: Uuid,
    provider_subscription_id: String,
    status: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = SubscriptionStatus::from_provider(&row.status).ok_or_else(|| {
            StoreError::Serialization(format!("invalid subscription status: {}", row.status))
        })?;

        Ok(Subscription {
            id: row.id,
            merchant_id: row.merchant_id,
            provider_subscription_id: row.provider_subscription_id,
            status,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    merchant_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    provider_invoice_id: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = parse_order_status(&row.status)?;

        Ok(Order {
            id: row.id,
            merchant_id: row.merchant_id,
            amount: row.amount,
            currency: row.currency,
            status,
            provider_invoice_id: row.provider_invoice_id,
            paid_at: row.paid_at,
            failed_at: row.failed_at,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_order_status(s: &str) -> Result<OrderStatus, StoreError> {
    match s {
        "pending" => Ok(OrderStatus::Pending),
        "paid" => Ok(OrderStatus::Paid),
        "failed" => Ok(OrderStatus::Failed),
        other => Err(StoreError::Serialization(format!(
            "invalid order status: {}",
            other
        ))),
    }
}

const SELECT_SUBSCRIPTION: &str = "SELECT id, merchant_id, provider_subscription_id, status, \
     current_period_start, current_period_end, cancel_at_period_end, canceled_at, \
     created_at, updated_at FROM subscriptions";

const SELECT_ORDER: &str = "SELECT id, merchant_id, amount, currency, status, \
     provider_invoice_id, paid_at, failed_at, failure_reason, created_at, updated_at \
     FROM orders";

/// One processing transaction over Postgres.
struct PostgresBillingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingTx for PostgresBillingTx {
    async fn event_for_processing(&mut self, id: Uuid) -> Result<Option<StoredEvent>, StoreError> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("{} WHERE id = $1 FOR UPDATE", SELECT_EVENT))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(StoreError::database)?;

        Ok(row.map(StoredEvent::from))
    }

    async fn mark_event_processed(
        &mut self,
        id: Uuid,
        final_retry_count: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE webhook_events \
             SET processed = TRUE, processed_at = NOW(), retry_count = $2 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(final_retry_count)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::database)?;

        Ok(())
    }

    async fn merchant_by_customer_id(
        &mut self,
        provider_customer_id: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        let row: Option<MerchantRow> = sqlx::query_as(
            "SELECT id, provider_customer_id, name, created_at \
             FROM merchants WHERE provider_customer_id = $1",
        )
        .bind(provider_customer_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::database)?;

        Ok(row.map(Merchant::from))
    }

    async fn subscription_by_provider_id(
        &mut self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE provider_subscription_id = $1 FOR UPDATE",
            SELECT_SUBSCRIPTION
        ))
        .bind(provider_subscription_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::database)?;

        row.map(Subscription::try_from).transpose()
    }

    async fn update_subscription(
        &mut self,
        subscription: &Subscription,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE subscriptions \
             SET status = $2, current_period_start = $3, current_period_end = $4, \
                 cancel_at_period_end = $5, canceled_at = $6, updated_at = $7 \
             WHERE id = $1",
        )
        .bind(subscription.id)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.canceled_at)
        .bind(subscription.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::database)?;

        Ok(())
    }

    async fn order_by_invoice_id(
        &mut self,
        provider_invoice_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "{} WHERE provider_invoice_id = $1 FOR UPDATE",
            SELECT_ORDER
        ))
        .bind(provider_invoice_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::database)?;

        row.map(Order::try_from).transpose()
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE orders \
             SET status = $2, provider_invoice_id = $3, paid_at = $4, failed_at = $5, \
                 failure_reason = $6, updated_at = $7 \
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(&order.provider_invoice_id)
        .bind(order.paid_at)
        .bind(order.failed_at)
        .bind(&order.failure_reason)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::database)?;

        Ok(())
    }

    async fn oldest_pending_order(
        &mut self,
        merchant_id: Uuid,
        amount: i64,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "{} WHERE merchant_id = $1 AND amount = $2 AND status = 'pending' \
               AND provider_invoice_id IS NULL \
             ORDER BY created_at ASC LIMIT 1 FOR UPDATE",
            SELECT_ORDER
        ))
        .bind(merchant_id)
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::database)?;

        row.map(Order::try_from).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::database)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(StoreError::database)
    }
}
