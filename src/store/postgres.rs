//! Postgres store.
//!
//! Each multi-record operation runs in one sqlx transaction; an early return
//! drops the transaction, which rolls it back. Stock reservation is a
//! conditional `UPDATE ... WHERE stock >= $n` whose affected-row count decides
//! success, so concurrent checkouts cannot oversell.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use super::{CheckoutCommit, OrderTransition, Settlement, StatusChange, Store};
use crate::domain::aggregates::{
    Address, AddressBook, Cart, CartLine, Order, OrderLine, Product, ShippingAddress, StockLevels, Transaction,
};
use crate::domain::value_objects::{Money, OrderCode, Size, TransactionCode};
use crate::stock::{stock_error, StockDirection, StockMovement};
use crate::{EcommerceError, Result};

const RESERVE_SQL: &str = r#"
UPDATE products SET
    stock = stock - $2,
    variant_stock = CASE WHEN variant_stock = '{}'::jsonb THEN variant_stock
        ELSE jsonb_set(variant_stock, ARRAY[$3::text], to_jsonb(COALESCE((variant_stock ->> $3::text)::int, 0) - $2)) END,
    updated_at = NOW()
WHERE id = $1 AND stock >= $2
  AND (variant_stock = '{}'::jsonb OR COALESCE((variant_stock ->> $3::text)::int, 0) >= $2)
"#;

const RELEASE_SQL: &str = r#"
UPDATE products SET
    stock = stock + $2,
    variant_stock = CASE WHEN variant_stock = '{}'::jsonb THEN variant_stock
        ELSE jsonb_set(variant_stock, ARRAY[$3::text], to_jsonb(COALESCE((variant_stock ->> $3::text)::int, 0) + $2)) END,
    updated_at = NOW()
WHERE id = $1
"#;

fn corrupt(what: impl std::fmt::Display) -> EcommerceError {
    EcommerceError::PersistenceFailure(format!("corrupt row: {what}"))
}

fn to_i32(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| EcommerceError::InvalidInput(format!("quantity {quantity} too large")))
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    category: String,
    price: Decimal,
    discounted_price: Option<Decimal>,
    currency: String,
    sizes: Vec<String>,
    stock: i32,
    variant_stock: Json<BTreeMap<String, i32>>,
    images: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = EcommerceError;
    fn try_from(row: ProductRow) -> Result<Self> {
        let sizes = row.sizes.into_iter().map(|s| Size::new(s).map_err(corrupt)).collect::<Result<Vec<_>>>()?;
        let variant_stock = row
            .variant_stock
            .0
            .into_iter()
            .map(|(s, q)| Ok((Size::new(s).map_err(corrupt)?, u32::try_from(q).map_err(corrupt)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Product {
            id: row.id,
            name: row.name,
            category: row.category,
            price: Money::new(row.price, &row.currency),
            discounted_price: row.discounted_price.map(|p| Money::new(p, &row.currency)),
            sizes,
            stock: u32::try_from(row.stock).map_err(corrupt)?,
            variant_stock,
            images: row.images,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    id: Uuid,
    product_id: Uuid,
    size: String,
    quantity: i32,
    added_at: DateTime<Utc>,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = EcommerceError;
    fn try_from(row: CartLineRow) -> Result<Self> {
        Ok(CartLine {
            id: row.id,
            product_id: row.product_id,
            size: Size::new(row.size).map_err(corrupt)?,
            quantity: u32::try_from(row.quantity).map_err(corrupt)?,
            added_at: row.added_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    name: String,
    phone: String,
    address_line1: String,
    address_line2: Option<String>,
    city: String,
    state: String,
    pincode: String,
    is_default: bool,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    code: String,
    user_id: Uuid,
    lines: Json<Vec<OrderLine>>,
    subtotal: Decimal,
    currency: String,
    status: String,
    shipping_address: Json<ShippingAddress>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = EcommerceError;
    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            id: row.id,
            code: OrderCode::from_raw(row.code),
            user_id: row.user_id,
            lines: row.lines.0,
            subtotal: Money::new(row.subtotal, &row.currency),
            status: row.status.parse().map_err(corrupt)?,
            shipping_address: row.shipping_address.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    code: String,
    user_id: Uuid,
    order_id: Uuid,
    order_code: String,
    amount: Decimal,
    currency: String,
    channel: String,
    method: String,
    status: String,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    gateway_signature: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = EcommerceError;
    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: row.id,
            code: TransactionCode::from_raw(row.code),
            user_id: row.user_id,
            order_id: row.order_id,
            order_code: row.order_code,
            amount: Money::new(row.amount, &row.currency),
            channel: row.channel.parse().map_err(corrupt)?,
            method: row.method,
            status: row.status.parse().map_err(corrupt)?,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            gateway_signature: row.gateway_signature,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

fn convert_all<R, T: TryFrom<R, Error = EcommerceError>>(rows: Vec<R>) -> Result<Vec<T>> {
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_product(conn: &mut PgConnection, id: Uuid, lock: bool) -> Result<Option<Product>> {
        let sql = if lock { "SELECT * FROM products WHERE id = $1 FOR UPDATE" } else { "SELECT * FROM products WHERE id = $1" };
        sqlx::query_as::<_, ProductRow>(sql).bind(id).fetch_optional(conn).await?.map(Product::try_from).transpose()
    }

    async fn apply_movement(conn: &mut PgConnection, movement: &StockMovement) -> Result<()> {
        let quantity = to_i32(movement.quantity)?;
        let sql = match movement.direction {
            StockDirection::Reserve => RESERVE_SQL,
            StockDirection::Release => RELEASE_SQL,
        };
        let result = sqlx::query(sql)
            .bind(movement.product_id)
            .bind(quantity)
            .bind(movement.size.as_str())
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 1 {
            return Ok(());
        }
        // Explain the refusal.
        let product = Self::load_product(conn, movement.product_id, false)
            .await?
            .ok_or_else(|| EcommerceError::product_not_found(movement.product_id))?;
        let mut probe = product.clone();
        Err(match probe.take_stock(&movement.size, movement.quantity) {
            Err(e) => stock_error(&product, movement.quantity, e),
            Ok(()) => EcommerceError::Conflict(format!("stock for {} changed concurrently", product.name)),
        })
    }

    async fn write_transition(conn: &mut PgConnection, transition: &OrderTransition) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2")
            .bind(transition.order_id)
            .bind(transition.from.as_str())
            .bind(transition.to.as_str())
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 1 {
            return Ok(());
        }
        let current: Option<(String, String)> = sqlx::query_as("SELECT code, status FROM orders WHERE id = $1")
            .bind(transition.order_id)
            .fetch_optional(&mut *conn)
            .await?;
        Err(match current {
            Some((code, status)) => EcommerceError::Conflict(format!("order {code} is {status}, expected {}", transition.from)),
            None => EcommerceError::order_not_found(transition.order_id),
        })
    }

    /// Returns whether the row was still pending.
    async fn write_settled_transaction(conn: &mut PgConnection, txn: &Transaction) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET method = $2, status = $3, gateway_payment_id = $4, gateway_signature = $5, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(txn.id)
        .bind(&txn.method)
        .bind(txn.status.as_str())
        .bind(&txn.gateway_payment_id)
        .bind(&txn.gateway_signature)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_product(&mut conn, id, false).await
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        let variant_stock = product
            .variant_stock()
            .iter()
            .map(|(s, q)| Ok((s.to_string(), to_i32(*q)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        sqlx::query(
            "INSERT INTO products (id, name, category, price, discounted_price, currency, sizes, stock, variant_stock, images, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO UPDATE SET name = $2, category = $3, price = $4, discounted_price = $5, currency = $6, \
             sizes = $7, stock = $8, variant_stock = $9, images = $10, updated_at = $12",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price.amount())
        .bind(product.discounted_price.as_ref().map(Money::amount))
        .bind(product.price.currency())
        .bind(product.sizes.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .bind(to_i32(product.stock())?)
        .bind(Json(variant_stock))
        .bind(&product.images)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_stock_levels(&self, product_id: Uuid, levels: &StockLevels) -> Result<Product> {
        let mut tx = self.pool.begin().await?;
        let mut product = Self::load_product(&mut tx, product_id, true)
            .await?
            .ok_or_else(|| EcommerceError::product_not_found(product_id))?;
        if let Err(e) = product.set_levels(levels.clone()) {
            return Err(stock_error(&product, 0, e));
        }
        let variant_stock = product
            .variant_stock()
            .iter()
            .map(|(s, q)| Ok((s.to_string(), to_i32(*q)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        sqlx::query("UPDATE products SET stock = $2, variant_stock = $3, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(to_i32(product.stock())?)
            .bind(Json(variant_stock))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn product_count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products").fetch_one(&self.pool).await?;
        u64::try_from(count).map_err(corrupt)
    }

    async fn low_stock_products(&self, below: u32) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE stock < $1 ORDER BY stock, name")
            .bind(i64::from(below))
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn cart(&self, user_id: Uuid) -> Result<Cart> {
        let rows = sqlx::query_as::<_, CartLineRow>("SELECT * FROM cart_lines WHERE user_id = $1 ORDER BY added_at, id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let updated_at = rows.iter().map(|r| r.added_at).max().unwrap_or_else(Utc::now);
        Ok(Cart::restore(user_id, convert_all(rows)?, updated_at))
    }

    async fn add_cart_line(&self, user_id: Uuid, product_id: Uuid, size: &Size, quantity: u32, limit: u32) -> Result<Option<CartLine>> {
        if quantity > limit {
            return Ok(None);
        }
        sqlx::query_as::<_, CartLineRow>(
            "INSERT INTO cart_lines (id, user_id, product_id, size, quantity, added_at) VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT (user_id, product_id, size) DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity \
             WHERE cart_lines.quantity + EXCLUDED.quantity <= $6 \
             RETURNING id, product_id, size, quantity, added_at",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(product_id)
        .bind(size.as_str())
        .bind(to_i32(quantity)?)
        .bind(i64::from(limit))
        .fetch_optional(&self.pool)
        .await?
        .map(CartLine::try_from)
        .transpose()
    }

    async fn set_cart_line_quantity(&self, user_id: Uuid, line_id: Uuid, quantity: u32) -> Result<Option<CartLine>> {
        sqlx::query_as::<_, CartLineRow>(
            "UPDATE cart_lines SET quantity = $3 WHERE id = $1 AND user_id = $2 RETURNING id, product_id, size, quantity, added_at",
        )
        .bind(line_id)
        .bind(user_id)
        .bind(to_i32(quantity)?)
        .fetch_optional(&self.pool)
        .await?
        .map(CartLine::try_from)
        .transpose()
    }

    async fn remove_cart_line(&self, user_id: Uuid, line_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND user_id = $2")
            .bind(line_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn address_book(&self, user_id: Uuid) -> Result<AddressBook> {
        let rows = sqlx::query_as::<_, AddressRow>("SELECT * FROM addresses WHERE user_id = $1 ORDER BY position")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let addresses = rows
            .into_iter()
            .map(|r| Address {
                id: r.id,
                name: r.name,
                phone: r.phone,
                address_line1: r.address_line1,
                address_line2: r.address_line2,
                city: r.city,
                state: r.state,
                pincode: r.pincode,
                is_default: r.is_default,
            })
            .collect();
        Ok(AddressBook::restore(user_id, addresses))
    }

    async fn save_address_book(&self, book: &AddressBook) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM addresses WHERE user_id = $1").bind(book.user_id()).execute(&mut *tx).await?;
        for (position, a) in book.addresses().iter().enumerate() {
            sqlx::query(
                "INSERT INTO addresses (id, user_id, position, name, phone, address_line1, address_line2, city, state, pincode, is_default) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(a.id)
            .bind(book.user_id())
            .bind(i32::try_from(position).map_err(corrupt)?)
            .bind(&a.name)
            .bind(&a.phone)
            .bind(&a.address_line1)
            .bind(&a.address_line2)
            .bind(&a.city)
            .bind(&a.state)
            .bind(&a.pincode)
            .bind(a.is_default)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn commit_checkout(&self, commit: &CheckoutCommit) -> Result<()> {
        let CheckoutCommit { order, transaction: txn, reservations, cart_lines } = commit;
        let mut tx = self.pool.begin().await?;

        for movement in reservations {
            Self::apply_movement(&mut tx, movement).await?;
        }

        sqlx::query(
            "INSERT INTO orders (id, code, user_id, lines, subtotal, currency, status, shipping_address, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(order.id)
        .bind(order.code.as_str())
        .bind(order.user_id)
        .bind(Json(&order.lines))
        .bind(order.subtotal.amount())
        .bind(order.subtotal.currency())
        .bind(order.status.as_str())
        .bind(Json(&order.shipping_address))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO transactions (id, code, user_id, order_id, order_code, amount, currency, channel, method, status, \
             gateway_order_id, gateway_payment_id, gateway_signature, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(txn.id)
        .bind(txn.code.as_str())
        .bind(txn.user_id)
        .bind(txn.order_id)
        .bind(&txn.order_code)
        .bind(txn.amount.amount())
        .bind(txn.amount.currency())
        .bind(txn.channel.as_str())
        .bind(&txn.method)
        .bind(txn.status.as_str())
        .bind(&txn.gateway_order_id)
        .bind(&txn.gateway_payment_id)
        .bind(&txn.gateway_signature)
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .execute(&mut *tx)
        .await?;

        if !cart_lines.is_empty() {
            sqlx::query("DELETE FROM cart_lines WHERE user_id = $1 AND id = ANY($2)")
                .bind(order.user_id)
                .bind(cart_lines)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(order = %order.code, "checkout committed");
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE status = 'pending' AND created_at < $1 ORDER BY created_at")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn transaction_by_code(&self, code: &str) -> Result<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn transaction_for_order(&self, order_id: Uuid) -> Result<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn settle_payment(&self, settlement: &Settlement) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        if !Self::write_settled_transaction(&mut tx, &settlement.transaction).await? {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM transactions WHERE id = $1")
                .bind(settlement.transaction.id)
                .fetch_optional(&mut *tx)
                .await?;
            return match exists {
                Some(_) => Ok(false),
                None => Err(EcommerceError::NotFound(format!("Transaction {}", settlement.transaction.code))),
            };
        }
        if let Some(transition) = &settlement.order_transition {
            Self::write_transition(&mut tx, transition).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn change_order_status(&self, change: &StatusChange) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_transition(&mut tx, &change.transition).await?;
        if let Some(txn) = &change.failed_transaction {
            if !Self::write_settled_transaction(&mut tx, txn).await? {
                return Err(EcommerceError::Conflict(format!("transaction {} already settled", txn.code)));
            }
        }
        for movement in &change.releases {
            Self::apply_movement(&mut tx, movement).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
