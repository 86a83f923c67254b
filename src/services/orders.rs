//! Order reads, admin status changes and reservation expiry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::domain::aggregates::{Order, OrderStatus, PaymentStatus, Transaction};
use crate::domain::value_objects::Money;
use crate::stock::{StockLedger, StockMovement};
use crate::store::{OrderTransition, StatusChange, Store};
use crate::{EcommerceError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub transaction: Option<Transaction>,
}

/// Products below this many units are reported as low on stock.
pub const LOW_STOCK_THRESHOLD: u32 = 10;
const LOW_STOCK_LISTED: usize = 10;
const RECENT_ORDERS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct LowStockProduct {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub stock: u32,
}

/// Back-office overview of the order pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub products: u64,
    pub orders: usize,
    pub transactions: usize,
    /// Sum of successful transaction amounts.
    pub total_sales: Money,
    pub low_stock_count: usize,
    pub low_stock_products: Vec<LowStockProduct>,
    pub recent_orders: Vec<Order>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    bus: EventBus,
    currency: String,
    reservation_ttl: Option<Duration>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, bus: EventBus, currency: impl Into<String>, reservation_ttl: Option<Duration>) -> Self {
        Self { store, bus, currency: currency.into(), reservation_ttl }
    }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        self.store.order(order_id).await?.ok_or_else(|| EcommerceError::order_not_found(order_id))
    }

    /// Another user's order is reported as missing.
    pub async fn order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        self.store
            .order(order_id)
            .await?
            .filter(|o| o.is_owned_by(user_id))
            .ok_or_else(|| EcommerceError::order_not_found(order_id))
    }

    pub async fn order_transaction(&self, user_id: Uuid, order_id: Uuid) -> Result<Transaction> {
        let order = self.order(user_id, order_id).await?;
        self.store
            .transaction_for_order(order.id)
            .await?
            .ok_or_else(|| EcommerceError::NotFound(format!("Transaction for order {}", order.code)))
    }

    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>> {
        self.store.orders_for_user(user_id).await
    }

    pub async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        self.store.transactions_for_user(user_id).await
    }

    pub async fn admin_orders(&self) -> Result<Vec<Order>> {
        self.store.all_orders().await
    }

    pub async fn admin_transactions(&self) -> Result<Vec<Transaction>> {
        self.store.all_transactions().await
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let orders = self.store.all_orders().await?;
        let transactions = self.store.all_transactions().await?;
        let low_stock = self.store.low_stock_products(LOW_STOCK_THRESHOLD).await?;

        let mut total_sales = Money::zero(&self.currency);
        for txn in transactions.iter().filter(|t| t.status == PaymentStatus::Success) {
            match total_sales.add(&txn.amount) {
                Ok(sum) => total_sales = sum,
                Err(_) => warn!(transaction = %txn.code, currency = txn.amount.currency(), "sale in another currency left out of total"),
            }
        }

        Ok(Dashboard {
            products: self.store.product_count().await?,
            orders: orders.len(),
            transactions: transactions.len(),
            total_sales,
            low_stock_count: low_stock.len(),
            low_stock_products: low_stock
                .into_iter()
                .take(LOW_STOCK_LISTED)
                .map(|p| LowStockProduct { stock: p.stock(), id: p.id, name: p.name, category: p.category })
                .collect(),
            recent_orders: orders.into_iter().take(RECENT_ORDERS).collect(),
        })
    }

    pub async fn admin_order(&self, order_id: Uuid) -> Result<OrderDetail> {
        let order = self.load(order_id).await?;
        let transaction = self.store.transaction_for_order(order_id).await?;
        Ok(OrderDetail { order, transaction })
    }

    /// Moves an order forward along its progression. Cancelling releases the
    /// reserved stock and fails a still-pending transaction in the same commit.
    #[instrument(skip(self))]
    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order> {
        let order = self.load(order_id).await?;
        let order = self.apply_status(order, status).await?;
        info!(order = %order.code, status = %order.status, "order status updated");
        Ok(order)
    }

    async fn apply_status(&self, mut order: Order, status: OrderStatus) -> Result<Order> {
        let from = order.status;
        order.transition(status)?;

        let mut releases = Vec::new();
        let mut failed_transaction = None;
        if status == OrderStatus::Cancelled {
            releases = StockLedger::releases(&order.lines);
            if let Some(mut txn) = self.store.transaction_for_order(order.id).await? {
                if txn.is_pending() {
                    txn.fail()?;
                    failed_transaction = Some(txn);
                }
            }
        }

        let mut events = order.take_events();
        events.extend(releases.iter().map(StockMovement::event));
        if let Some(txn) = failed_transaction.as_mut() {
            events.extend(txn.take_events());
        }

        let change = StatusChange { transition: OrderTransition { order_id: order.id, from, to: status }, releases, failed_transaction };
        self.store.change_order_status(&change).await?;
        self.bus.publish_all(events).await;
        Ok(order)
    }

    /// Cancels pending orders older than the reservation TTL whose payment
    /// never succeeded (still pending, or failed on a bad signature), returning
    /// their stock. Returns how many were cancelled.
    #[instrument(skip(self))]
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let Some(ttl) = self.reservation_ttl else { return Ok(0) };
        let mut expired = 0;
        for order in self.store.stale_pending_orders(now - ttl).await? {
            let paid = self.store.transaction_for_order(order.id).await?.is_some_and(|t| t.status == PaymentStatus::Success);
            if paid {
                continue;
            }
            let code = order.code.clone();
            match self.apply_status(order, OrderStatus::Cancelled).await {
                Ok(_) => {
                    info!(order = %code, "reservation expired");
                    expired += 1;
                }
                // Confirmed or cancelled concurrently.
                Err(EcommerceError::Conflict(reason)) => debug!(order = %code, %reason, "skipping expiry"),
                Err(e) => warn!(order = %code, error = %e, "failed to expire reservation"),
            }
        }
        Ok(expired)
    }

    /// Runs [`OrderService::expire_stale`] every `period` until the runtime
    /// shuts down. Does nothing when expiry is disabled.
    pub fn spawn_expiry_sweep(&self, period: std::time::Duration) -> Option<JoinHandle<()>> {
        if self.reservation_ttl.is_none() {
            return None;
        }
        let service = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.expire_stale(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => info!(expired = n, "reservation sweep finished"),
                    Err(e) => warn!(error = %e, "reservation sweep failed"),
                }
            }
        }))
    }
}
