//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Size;

/// Per-user cart. Lines are unique on (product, size).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    user_id: Uuid,
    lines: Vec<CartLine>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size: Size,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id, lines: vec![], updated_at: Utc::now() }
    }

    pub fn restore(user_id: Uuid, lines: Vec<CartLine>, updated_at: DateTime<Utc>) -> Self {
        Self { user_id, lines, updated_at }
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, id: Uuid) -> Option<&CartLine> { self.lines.iter().find(|l| l.id == id) }

    pub fn quantity_of(&self, product_id: Uuid, size: &Size) -> u32 {
        self.lines.iter().find(|l| l.product_id == product_id && &l.size == size).map_or(0, |l| l.quantity)
    }

    /// Adds `quantity` units, summing into the existing (product, size) line if any.
    pub fn add(&mut self, product_id: Uuid, size: Size, quantity: u32) -> &CartLine {
        let idx = match self.lines.iter().position(|l| l.product_id == product_id && l.size == size) {
            Some(idx) => {
                self.lines[idx].quantity += quantity;
                idx
            }
            None => {
                self.lines.push(CartLine { id: Uuid::now_v7(), product_id, size, quantity, added_at: Utc::now() });
                self.lines.len() - 1
            }
        };
        self.touch();
        &self.lines[idx]
    }

    /// Zero removes the line.
    pub fn set_quantity(&mut self, line_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let line = self.lines.iter_mut().find(|l| l.id == line_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.lines.retain(|l| l.id != line_id); }
        else { line.quantity = quantity; }
        self.touch();
        Ok(())
    }

    /// Returns whether a line was removed.
    pub fn remove(&mut self, line_id: Uuid) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        let removed = self.lines.len() != before;
        if removed { self.touch(); }
        removed
    }

    pub fn remove_lines(&mut self, line_ids: &[Uuid]) {
        self.lines.retain(|l| !line_ids.contains(&l.id));
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Item not found") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_coalesces_same_product_and_size() {
        let mut cart = Cart::new(Uuid::now_v7());
        let product = Uuid::now_v7();
        cart.add(product, Size::new("M").unwrap(), 2);
        cart.add(product, Size::new("M").unwrap(), 3);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 5);
        cart.add(product, Size::new("L").unwrap(), 1);
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::new(Uuid::now_v7());
        let id = cart.add(Uuid::now_v7(), Size::new("S").unwrap(), 1).id;
        cart.set_quantity(id, 4).unwrap();
        assert_eq!(cart.lines()[0].quantity, 4);
        cart.set_quantity(id, 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.set_quantity(id, 1), Err(CartError::ItemNotFound));
        assert!(!cart.remove(id));
    }
}
