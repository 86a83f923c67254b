//! Storage-agnostic persistence.
//!
//! Services depend on [`Store`] only; the concrete backend is injected at
//! startup. Every multi-record mutation is a single trait call so each backend
//! can make it atomic (one sqlx transaction, or one lock acquisition). Cart
//! writes touch one line at a time; a whole cart is never written back.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::aggregates::{AddressBook, Cart, CartLine, Order, OrderStatus, Product, StockLevels, Transaction};
use crate::domain::value_objects::Size;
use crate::stock::StockMovement;
use crate::Result;

/// Everything a checkout writes, committed together or not at all.
#[derive(Debug, Clone)]
pub struct CheckoutCommit {
    pub order: Order,
    pub transaction: Transaction,
    pub reservations: Vec<StockMovement>,
    /// Cart lines consumed by this order; empty for buy-now.
    pub cart_lines: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTransition {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Terminal state of a pending transaction, plus the order transition that
/// goes with it.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction: Transaction,
    pub order_transition: Option<OrderTransition>,
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub transition: OrderTransition,
    pub releases: Vec<StockMovement>,
    /// Pending transaction to mark failed alongside the change.
    pub failed_transaction: Option<Transaction>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn save_product(&self, product: &Product) -> Result<()>;
    async fn set_stock_levels(&self, product_id: Uuid, levels: &StockLevels) -> Result<Product>;
    async fn product_count(&self) -> Result<u64>;
    /// Products with fewer than `below` units in stock, scarcest first.
    async fn low_stock_products(&self, below: u32) -> Result<Vec<Product>>;

    async fn cart(&self, user_id: Uuid) -> Result<Cart>;
    /// Adds `quantity` to the user's (product, size) line, creating it if
    /// needed. Returns `None`, writing nothing, when the line's combined
    /// quantity would exceed `limit`.
    async fn add_cart_line(&self, user_id: Uuid, product_id: Uuid, size: &Size, quantity: u32, limit: u32)
        -> Result<Option<CartLine>>;
    /// `None` when the user has no such line. `quantity` must be positive.
    async fn set_cart_line_quantity(&self, user_id: Uuid, line_id: Uuid, quantity: u32) -> Result<Option<CartLine>>;
    /// Returns whether a line was removed.
    async fn remove_cart_line(&self, user_id: Uuid, line_id: Uuid) -> Result<bool>;

    async fn address_book(&self, user_id: Uuid) -> Result<AddressBook>;
    async fn save_address_book(&self, book: &AddressBook) -> Result<()>;

    async fn commit_checkout(&self, commit: &CheckoutCommit) -> Result<()>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>>;
    /// Newest first.
    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
    async fn all_orders(&self) -> Result<Vec<Order>>;
    /// Pending orders created before `cutoff`.
    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;

    async fn transaction_by_code(&self, code: &str) -> Result<Option<Transaction>>;
    async fn transaction_for_order(&self, order_id: Uuid) -> Result<Option<Transaction>>;
    async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>>;
    /// Newest first.
    async fn all_transactions(&self) -> Result<Vec<Transaction>>;

    /// Writes the settled transaction only if it is still pending. Returns
    /// `false` when another caller settled it first; nothing is written then.
    async fn settle_payment(&self, settlement: &Settlement) -> Result<bool>;
    /// Fails with `Conflict` when the order is no longer in `transition.from`.
    async fn change_order_status(&self, change: &StatusChange) -> Result<()>;
}
