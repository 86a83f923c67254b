//! Stock ledger.
//!
//! The only component allowed to change product stock. Reservations and
//! releases are [`StockMovement`]s; the store applies them inside the same
//! atomic unit as the order write (checkout) or status change (cancel), as
//! conditional decrements, so two checkouts racing for the last unit cannot
//! both succeed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::aggregates::{OrderLine, Product, ProductError, StockLevels};
use crate::domain::events::{DomainEvent, StockEvent};
use crate::domain::value_objects::Size;
use crate::store::Store;
use crate::{EcommerceError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockDirection { Reserve, Release }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: Uuid,
    pub size: Size,
    pub quantity: u32,
    pub direction: StockDirection,
}

impl StockMovement {
    pub fn reserve(product_id: Uuid, size: Size, quantity: u32) -> Self {
        Self { product_id, size, quantity, direction: StockDirection::Reserve }
    }

    pub fn release(product_id: Uuid, size: Size, quantity: u32) -> Self {
        Self { product_id, size, quantity, direction: StockDirection::Release }
    }

    /// Applies the movement to an in-memory product.
    pub fn apply_to(&self, product: &mut Product) -> Result<()> {
        match self.direction {
            StockDirection::Reserve => product.take_stock(&self.size, self.quantity).map_err(|e| stock_error(product, self.quantity, e)),
            StockDirection::Release => {
                product.restore_stock(&self.size, self.quantity);
                Ok(())
            }
        }
    }

    pub fn event(&self) -> DomainEvent {
        let (product_id, size, quantity) = (self.product_id, self.size.clone(), self.quantity);
        match self.direction {
            StockDirection::Reserve => DomainEvent::Stock(StockEvent::Reserved { product_id, size, quantity }),
            StockDirection::Release => DomainEvent::Stock(StockEvent::Released { product_id, size, quantity }),
        }
    }
}

pub(crate) fn stock_error(product: &Product, requested: u32, err: ProductError) -> EcommerceError {
    match err {
        ProductError::InvalidSize(size) => EcommerceError::InvalidInput(format!("size {} is not offered for {}", size, product.name)),
        ProductError::InsufficientStock { available } => {
            EcommerceError::InsufficientStock { product: product.name.clone(), requested, available }
        }
    }
}

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn Store>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Units currently available for `size` (variant-aware).
    pub async fn check_available(&self, product_id: Uuid, size: &Size) -> Result<u32> {
        let product = self.store.product(product_id).await?.ok_or_else(|| EcommerceError::product_not_found(product_id))?;
        product.ensure_size(size).map_err(|e| stock_error(&product, 0, e))?;
        Ok(product.available(size))
    }

    /// Validates size and quantity against a loaded product without mutating it.
    /// Advisory only: the authoritative check happens inside the reservation.
    pub fn ensure_available(product: &Product, size: &Size, quantity: u32) -> Result<()> {
        product.ensure_size(size).map_err(|e| stock_error(product, quantity, e))?;
        let available = product.available(size);
        if quantity > available {
            return Err(EcommerceError::InsufficientStock { product: product.name.clone(), requested: quantity, available });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restock(&self, product_id: Uuid, levels: StockLevels) -> Result<Product> {
        self.store.set_stock_levels(product_id, &levels).await
    }

    pub fn reservations(lines: &[OrderLine]) -> Vec<StockMovement> {
        lines.iter().map(|l| StockMovement::reserve(l.product_id, l.size.clone(), l.quantity)).collect()
    }

    pub fn releases(lines: &[OrderLine]) -> Vec<StockMovement> {
        lines.iter().map(|l| StockMovement::release(l.product_id, l.size.clone(), l.quantity)).collect()
    }
}
