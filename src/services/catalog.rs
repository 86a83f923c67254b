//! Product lookup, availability, and back-office creation and restocking.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Product, StockLevels};
use crate::domain::value_objects::{Money, Size};
use crate::stock::StockLedger;
use crate::store::Store;
use crate::{EcommerceError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub category: String,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    #[validate(length(min = 1))]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub stock: Option<StockLevels>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub product_id: Uuid,
    pub size: Size,
    pub available: u32,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    ledger: StockLedger,
    currency: String,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, currency: impl Into<String>) -> Self {
        Self { ledger: StockLedger::new(store.clone()), store, currency: currency.into() }
    }

    pub async fn product(&self, id: Uuid) -> Result<Product> {
        self.store.product(id).await?.ok_or_else(|| EcommerceError::product_not_found(id))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        input.validate()?;
        if input.price <= Decimal::ZERO {
            return Err(EcommerceError::InvalidInput("price must be positive".into()));
        }
        if let Some(discounted) = input.discounted_price {
            if discounted <= Decimal::ZERO || discounted > input.price {
                return Err(EcommerceError::InvalidInput("discounted price must be positive and not above the price".into()));
            }
        }
        let mut sizes: Vec<Size> = Vec::with_capacity(input.sizes.len());
        for raw in input.sizes {
            let size = Size::new(raw)?;
            if !sizes.contains(&size) {
                sizes.push(size);
            }
        }

        let mut product = Product::create(input.name.trim(), input.category.trim(), Money::new(input.price, &self.currency), sizes);
        product.discounted_price = input.discounted_price.map(|p| Money::new(p, &self.currency));
        product.images = input.images;
        if let Some(levels) = input.stock {
            product.set_levels(levels).map_err(|e| crate::stock::stock_error(&product, 0, e))?;
        }
        self.store.save_product(&product).await?;
        info!(product_id = %product.id, stock = product.stock(), "product created");
        Ok(product)
    }

    /// Units of `size` that can be carted or bought right now.
    pub async fn availability(&self, product_id: Uuid, size: &str) -> Result<Availability> {
        let size = Size::new(size)?;
        let available = self.ledger.check_available(product_id, &size).await?;
        Ok(Availability { product_id, size, available })
    }

    /// Replaces the product's stock levels.
    pub async fn update_stock(&self, product_id: Uuid, levels: StockLevels) -> Result<Product> {
        self.ledger.restock(product_id, levels).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn new_product() -> NewProduct {
        NewProduct {
            name: "Anarkali".into(), category: "WOMEN'S COLLECTION".into(), price: dec!(2999), discounted_price: Some(dec!(2499)),
            sizes: vec!["s".into(), "M".into(), "m".into()], images: vec!["/uploads/a.jpg".into()], stock: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_restock_per_size() {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()), "INR");
        let product = catalog.create_product(new_product()).await.unwrap();
        assert_eq!(product.sizes.len(), 2);
        assert_eq!(product.effective_price(), &Money::inr(dec!(2499)));

        let levels = StockLevels::PerSize(BTreeMap::from([(Size::new("S").unwrap(), 2), (Size::new("M").unwrap(), 3)]));
        let restocked = catalog.update_stock(product.id, levels).await.unwrap();
        assert_eq!(restocked.stock(), 5);
        assert_eq!(catalog.product(product.id).await.unwrap().available(&Size::new("M").unwrap()), 3);

        assert_eq!(catalog.availability(product.id, "s").await.unwrap().available, 2);
        assert_matches!(catalog.availability(product.id, "XL").await, Err(EcommerceError::InvalidInput(_)));

        let unknown = StockLevels::PerSize(BTreeMap::from([(Size::new("XL").unwrap(), 1)]));
        assert_matches!(catalog.update_stock(product.id, unknown).await, Err(EcommerceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_prices() {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()), "INR");
        let mut input = new_product();
        input.discounted_price = Some(dec!(3500));
        assert_matches!(catalog.create_product(input).await, Err(EcommerceError::InvalidInput(_)));
        let mut input = new_product();
        input.price = dec!(0);
        assert_matches!(catalog.create_product(input).await, Err(EcommerceError::InvalidInput(_)));
        let mut input = new_product();
        input.sizes.clear();
        assert_matches!(catalog.create_product(input).await, Err(EcommerceError::InvalidInput(_)));
    }
}
