//! In-process document store.
//!
//! One mutex guards the whole state; every trait call takes it exactly once,
//! which makes each call atomic with respect to every other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CheckoutCommit, OrderTransition, Settlement, StatusChange, Store};
use crate::domain::aggregates::{AddressBook, Cart, CartLine, Order, OrderStatus, PaymentStatus, Product, StockLevels, Transaction};
use crate::domain::value_objects::Size;
use crate::stock::{stock_error, StockMovement};
use crate::{EcommerceError, Result};

#[derive(Debug, Default)]
struct State {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    address_books: HashMap<Uuid, AddressBook>,
    orders: HashMap<Uuid, Order>,
    transactions: HashMap<Uuid, Transaction>,
}

impl State {
    /// Applies movements to copies first so a failure leaves products untouched.
    fn apply_movements(&mut self, movements: &[StockMovement]) -> Result<()> {
        let mut staged: HashMap<Uuid, Product> = HashMap::new();
        for movement in movements {
            if !staged.contains_key(&movement.product_id) {
                let product = self
                    .products
                    .get(&movement.product_id)
                    .ok_or_else(|| EcommerceError::product_not_found(movement.product_id))?;
                staged.insert(movement.product_id, product.clone());
            }
            if let Some(product) = staged.get_mut(&movement.product_id) {
                movement.apply_to(product)?;
            }
        }
        self.products.extend(staged);
        Ok(())
    }

    fn check_transition(&self, transition: &OrderTransition) -> Result<()> {
        let order = self.orders.get(&transition.order_id).ok_or_else(|| EcommerceError::order_not_found(transition.order_id))?;
        if order.status != transition.from {
            return Err(EcommerceError::Conflict(format!("order {} is {}, expected {}", order.code, order.status, transition.from)));
        }
        Ok(())
    }

    fn write_transition(&mut self, transition: &OrderTransition) {
        if let Some(order) = self.orders.get_mut(&transition.order_id) {
            order.status = transition.to;
            order.updated_at = Utc::now();
        }
    }

    fn write_transaction(&mut self, txn: &Transaction) {
        let mut stored = txn.clone();
        stored.events.clear();
        self.transactions.insert(stored.id, stored);
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn newest_first<T>(mut items: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        self.state.lock().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn set_stock_levels(&self, product_id: Uuid, levels: &StockLevels) -> Result<Product> {
        let mut state = self.state.lock().await;
        let product = state.products.get_mut(&product_id).ok_or_else(|| EcommerceError::product_not_found(product_id))?;
        let mut updated = product.clone();
        updated.set_levels(levels.clone()).map_err(|e| stock_error(&updated, 0, e))?;
        *product = updated.clone();
        Ok(updated)
    }

    async fn product_count(&self) -> Result<u64> {
        Ok(self.state.lock().await.products.len() as u64)
    }

    async fn low_stock_products(&self, below: u32) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state.products.values().filter(|p| p.stock() < below).cloned().collect();
        products.sort_by(|a, b| a.stock().cmp(&b.stock()).then_with(|| a.name.cmp(&b.name)));
        Ok(products)
    }

    async fn cart(&self, user_id: Uuid) -> Result<Cart> {
        Ok(self.state.lock().await.carts.get(&user_id).cloned().unwrap_or_else(|| Cart::new(user_id)))
    }

    async fn add_cart_line(&self, user_id: Uuid, product_id: Uuid, size: &Size, quantity: u32, limit: u32) -> Result<Option<CartLine>> {
        let mut state = self.state.lock().await;
        let cart = state.carts.entry(user_id).or_insert_with(|| Cart::new(user_id));
        if cart.quantity_of(product_id, size).saturating_add(quantity) > limit {
            return Ok(None);
        }
        Ok(Some(cart.add(product_id, size.clone(), quantity).clone()))
    }

    async fn set_cart_line_quantity(&self, user_id: Uuid, line_id: Uuid, quantity: u32) -> Result<Option<CartLine>> {
        let mut state = self.state.lock().await;
        let Some(cart) = state.carts.get_mut(&user_id) else { return Ok(None) };
        if cart.set_quantity(line_id, quantity).is_err() {
            return Ok(None);
        }
        Ok(cart.line(line_id).cloned())
    }

    async fn remove_cart_line(&self, user_id: Uuid, line_id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.carts.get_mut(&user_id).is_some_and(|cart| cart.remove(line_id)))
    }

    async fn address_book(&self, user_id: Uuid) -> Result<AddressBook> {
        Ok(self.state.lock().await.address_books.get(&user_id).cloned().unwrap_or_else(|| AddressBook::new(user_id)))
    }

    async fn save_address_book(&self, book: &AddressBook) -> Result<()> {
        self.state.lock().await.address_books.insert(book.user_id(), book.clone());
        Ok(())
    }

    async fn commit_checkout(&self, commit: &CheckoutCommit) -> Result<()> {
        let mut state = self.state.lock().await;
        state.apply_movements(&commit.reservations)?;

        let mut order = commit.order.clone();
        order.events.clear();
        state.orders.insert(order.id, order);
        state.write_transaction(&commit.transaction);

        if !commit.cart_lines.is_empty() {
            if let Some(cart) = state.carts.get_mut(&commit.order.user_id) {
                cart.remove_lines(&commit.cart_lines);
            }
        }
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let orders = state.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        Ok(newest_first(orders, |o: &Order| o.created_at))
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let orders = self.state.lock().await.orders.values().cloned().collect();
        Ok(newest_first(orders, |o: &Order| o.created_at))
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect();
        Ok(newest_first(orders, |o: &Order| o.created_at))
    }

    async fn transaction_by_code(&self, code: &str) -> Result<Option<Transaction>> {
        Ok(self.state.lock().await.transactions.values().find(|t| t.code.as_str() == code).cloned())
    }

    async fn transaction_for_order(&self, order_id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.state.lock().await.transactions.values().find(|t| t.order_id == order_id).cloned())
    }

    async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let state = self.state.lock().await;
        let txns = state.transactions.values().filter(|t| t.user_id == user_id).cloned().collect();
        Ok(newest_first(txns, |t: &Transaction| t.created_at))
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let txns = self.state.lock().await.transactions.values().cloned().collect();
        Ok(newest_first(txns, |t: &Transaction| t.created_at))
    }

    async fn settle_payment(&self, settlement: &Settlement) -> Result<bool> {
        let mut state = self.state.lock().await;
        let txn = &settlement.transaction;
        let still_pending = state.transactions.get(&txn.id).map(|t| t.status == PaymentStatus::Pending);
        match still_pending {
            None => return Err(EcommerceError::NotFound(format!("Transaction {}", txn.code))),
            Some(false) => return Ok(false),
            Some(true) => {}
        }
        if let Some(transition) = &settlement.order_transition {
            state.check_transition(transition)?;
            state.write_transition(transition);
        }
        state.write_transaction(txn);
        Ok(true)
    }

    async fn change_order_status(&self, change: &StatusChange) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_transition(&change.transition)?;
        if let Some(txn) = &change.failed_transaction {
            let pending = state.transactions.get(&txn.id).is_some_and(|t| t.status == PaymentStatus::Pending);
            if !pending {
                return Err(EcommerceError::Conflict(format!("transaction {} already settled", txn.code)));
            }
        }
        state.apply_movements(&change.releases)?;
        state.write_transition(&change.transition);
        if let Some(txn) = &change.failed_transaction {
            state.write_transaction(txn);
        }
        Ok(())
    }
}
