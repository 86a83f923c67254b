//! Cart store operations.
//!
//! Every write is validated against live stock. Prices shown by
//! [`CartService::get_cart`] are live catalog prices; they are frozen only
//! when an order is placed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{CartLine, Product};
use crate::domain::value_objects::{Money, Size};
use crate::stock::StockLedger;
use crate::store::Store;
use crate::{EcommerceError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 16))]
    pub size: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQuantityRequest {
    /// Zero or negative removes the line.
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub name: String,
    pub price: Money,
    pub discounted_price: Option<Money>,
    pub image: String,
    pub available: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    #[serde(flatten)]
    pub line: CartLine,
    /// `None` once the product has been removed from the catalog.
    pub product: Option<ProductSummary>,
    pub line_total: Option<Money>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub user_id: Uuid,
    pub items: Vec<CartItemView>,
    pub item_count: u32,
    pub subtotal: Money,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    currency: String,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, currency: impl Into<String>) -> Self {
        Self { store, currency: currency.into() }
    }

    async fn product(&self, id: Uuid) -> Result<Product> {
        self.store.product(id).await?.ok_or_else(|| EcommerceError::product_not_found(id))
    }

    /// Adds to the (product, size) line, creating it if needed. The combined
    /// quantity must fit current stock for that size; the store re-checks it
    /// against the line as it stands when the write lands.
    #[instrument(skip(self, req), fields(product_id = %req.product_id))]
    pub async fn add_item(&self, user_id: Uuid, req: AddItemRequest) -> Result<CartLine> {
        req.validate()?;
        let product = self.product(req.product_id).await?;
        let size = Size::new(req.size)?;

        let in_cart = self.store.cart(user_id).await?.quantity_of(product.id, &size);
        StockLedger::ensure_available(&product, &size, in_cart.saturating_add(req.quantity))?;

        let available = product.available(&size);
        match self.store.add_cart_line(user_id, product.id, &size, req.quantity, available).await? {
            Some(line) => Ok(line),
            None => {
                let in_cart = self.store.cart(user_id).await?.quantity_of(product.id, &size);
                Err(EcommerceError::InsufficientStock { product: product.name, requested: in_cart.saturating_add(req.quantity), available })
            }
        }
    }

    /// Returns the updated line, or `None` when the line was removed.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, user_id: Uuid, item_id: Uuid, quantity: i64) -> Result<Option<CartLine>> {
        let not_found = || EcommerceError::NotFound(format!("Cart item {item_id}"));
        let line = self.store.cart(user_id).await?.line(item_id).cloned().ok_or_else(not_found)?;

        if quantity <= 0 {
            self.store.remove_cart_line(user_id, item_id).await?;
            return Ok(None);
        }
        let quantity = u32::try_from(quantity).map_err(|_| EcommerceError::InvalidInput(format!("quantity {quantity} too large")))?;
        let product = self.product(line.product_id).await?;
        StockLedger::ensure_available(&product, &line.size, quantity)?;

        let updated = self.store.set_cart_line_quantity(user_id, item_id, quantity).await?.ok_or_else(not_found)?;
        Ok(Some(updated))
    }

    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<()> {
        self.store.remove_cart_line(user_id, item_id).await?;
        Ok(())
    }

    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView> {
        let cart = self.store.cart(user_id).await?;
        let mut subtotal = Money::zero(&self.currency);
        let mut items = Vec::with_capacity(cart.lines().len());

        for line in cart.lines() {
            let product = self.store.product(line.product_id).await?;
            let line_total = product.as_ref().map(|p| p.effective_price().multiply(line.quantity));
            if let Some(total) = &line_total {
                match subtotal.add(total) {
                    Ok(sum) => subtotal = sum,
                    Err(_) => warn!(product_id = %line.product_id, "cart line priced in another currency"),
                }
            }
            let product = product.map(|p| ProductSummary {
                available: p.available(&line.size),
                image: p.primary_image().to_string(),
                name: p.name,
                price: p.price,
                discounted_price: p.discounted_price,
            });
            items.push(CartItemView { line: line.clone(), product, line_total });
        }

        Ok(CartView { user_id, item_count: cart.lines().iter().map(|l| l.quantity).sum(), items, subtotal })
    }
}
