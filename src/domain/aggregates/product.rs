//! Product Aggregate
//!
//! A product carries either a single aggregate stock count or a per-size
//! variant stock map. When the map is in use the aggregate is always the sum of
//! its entries; every mutation goes through [`Product::take_stock`],
//! [`Product::restore_stock`] or [`Product::set_levels`] to keep it that way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Size};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub price: Money,
    pub discounted_price: Option<Money>,
    pub sizes: Vec<Size>,
    pub(crate) stock: u32,
    pub(crate) variant_stock: BTreeMap<Size, u32>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Absolute stock levels set by the back-office.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevels {
    Aggregate(u32),
    PerSize(BTreeMap<Size, u32>),
}

impl Product {
    pub fn create(name: impl Into<String>, category: impl Into<String>, price: Money, sizes: Vec<Size>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into(), category: category.into(), price, discounted_price: None,
            sizes, stock: 0, variant_stock: BTreeMap::new(), images: vec![], created_at: now, updated_at: now,
        }
    }

    pub fn stock(&self) -> u32 { self.stock }
    pub fn variant_stock(&self) -> &BTreeMap<Size, u32> { &self.variant_stock }
    pub fn uses_variant_stock(&self) -> bool { !self.variant_stock.is_empty() }
    pub fn has_size(&self, size: &Size) -> bool { self.sizes.contains(size) }
    pub fn primary_image(&self) -> &str { self.images.first().map(String::as_str).unwrap_or("") }

    /// Discounted price when present, list price otherwise.
    pub fn effective_price(&self) -> &Money { self.discounted_price.as_ref().unwrap_or(&self.price) }

    /// Units available for `size`: the variant entry when variant stock is in
    /// use (a missing entry counts as zero), the aggregate otherwise.
    pub fn available(&self, size: &Size) -> u32 {
        if self.uses_variant_stock() { self.variant_stock.get(size).copied().unwrap_or(0) } else { self.stock }
    }

    pub fn ensure_size(&self, size: &Size) -> Result<(), ProductError> {
        if self.has_size(size) { Ok(()) } else { Err(ProductError::InvalidSize(size.clone())) }
    }

    pub fn take_stock(&mut self, size: &Size, qty: u32) -> Result<(), ProductError> {
        let available = self.available(size);
        if qty > available || qty > self.stock {
            return Err(ProductError::InsufficientStock { available: available.min(self.stock) });
        }
        if self.uses_variant_stock() {
            self.variant_stock.insert(size.clone(), available - qty);
        }
        self.stock -= qty;
        self.touch();
        Ok(())
    }

    pub fn restore_stock(&mut self, size: &Size, qty: u32) {
        if self.uses_variant_stock() {
            *self.variant_stock.entry(size.clone()).or_insert(0) += qty;
        }
        self.stock = self.stock.saturating_add(qty);
        self.touch();
    }

    pub fn set_levels(&mut self, levels: StockLevels) -> Result<(), ProductError> {
        match levels {
            StockLevels::Aggregate(stock) => {
                self.variant_stock.clear();
                self.stock = stock;
            }
            StockLevels::PerSize(map) => {
                if let Some(unknown) = map.keys().find(|s| !self.has_size(s)) {
                    return Err(ProductError::InvalidSize(unknown.clone()));
                }
                self.stock = map.values().sum();
                self.variant_stock = map;
            }
        }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { InvalidSize(Size), InsufficientStock { available: u32 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSize(size) => write!(f, "Invalid size {size}"),
            Self::InsufficientStock { available } => write!(f, "Insufficient stock ({available} available)"),
        }
    }
}
