//! Pricing and snapshot engine.
//!
//! Runs once per order: freezes each line at the product's effective price
//! (discounted price when present) and deep-copies the shipping address.
//! Nothing downstream recomputes from live catalog prices.

use crate::domain::aggregates::{Address, OrderLine, Product, ShippingAddress};
use crate::domain::value_objects::{Money, Size};
use crate::{EcommerceError, Result};

/// One product/size/quantity to be priced.
#[derive(Debug, Clone)]
pub struct LineRequest<'a> {
    pub product: &'a Product,
    pub size: Size,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub shipping_address: ShippingAddress,
}

pub fn snapshot(requests: &[LineRequest<'_>], address: &Address) -> Result<OrderSnapshot> {
    let first = requests.first().ok_or_else(|| EcommerceError::InvalidInput("no items to order".into()))?;
    let mut subtotal = Money::zero(first.product.effective_price().currency());
    let mut lines = Vec::with_capacity(requests.len());

    for req in requests {
        if req.quantity == 0 {
            return Err(EcommerceError::InvalidInput(format!("quantity for {} must be positive", req.product.name)));
        }
        let unit_price = req.product.effective_price().clone();
        let line = OrderLine {
            product_id: req.product.id,
            name: req.product.name.clone(),
            unit_price,
            quantity: req.quantity,
            size: req.size.clone(),
            image: req.product.primary_image().to_string(),
        };
        subtotal = subtotal
            .add(&line.line_total())
            .map_err(|_| EcommerceError::InvalidInput("items priced in different currencies".into()))?;
        lines.push(line);
    }

    Ok(OrderSnapshot { lines, subtotal, shipping_address: ShippingAddress::from(address) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn product(price: Money, discounted: Option<Money>) -> Product {
        let mut p = Product::create("Kurta", "MEN'S COLLECTION", price, vec![Size::new("M").unwrap()]);
        p.discounted_price = discounted;
        p.images = vec!["/uploads/kurta.jpg".into()];
        p
    }

    fn address() -> Address {
        Address {
            id: Uuid::now_v7(), name: "Asha".into(), phone: "9876543210".into(), address_line1: "1 Road".into(),
            address_line2: None, city: "Pune".into(), state: "MH".into(), pincode: "411001".into(), is_default: true,
        }
    }

    #[test]
    fn test_snapshot_uses_effective_price() {
        let a = product(Money::inr(dec!(500)), None);
        let b = product(Money::inr(dec!(1200)), Some(Money::inr(dec!(999.50))));
        let m = Size::new("M").unwrap();
        let snap = snapshot(
            &[LineRequest { product: &a, size: m.clone(), quantity: 2 }, LineRequest { product: &b, size: m, quantity: 1 }],
            &address(),
        )
        .unwrap();
        assert_eq!(snap.subtotal, Money::inr(dec!(1999.50)));
        assert_eq!(snap.lines[1].unit_price, Money::inr(dec!(999.50)));
        assert_eq!(snap.lines[0].image, "/uploads/kurta.jpg");
        let total = snap.lines.iter().fold(Money::inr(dec!(0)), |acc, l| acc.add(&l.line_total()).unwrap());
        assert_eq!(total, snap.subtotal);
    }

    #[test]
    fn test_snapshot_is_frozen_against_catalog_edits() {
        let mut p = product(Money::inr(dec!(500)), None);
        let snap = snapshot(&[LineRequest { product: &p, size: Size::new("M").unwrap(), quantity: 1 }], &address()).unwrap();
        p.price = Money::inr(dec!(800));
        assert_eq!(snap.lines[0].unit_price, Money::inr(dec!(500)));
    }

    #[test]
    fn test_snapshot_rejects_empty_and_mixed_currency() {
        assert_matches!(snapshot(&[], &address()), Err(EcommerceError::InvalidInput(_)));
        let a = product(Money::inr(dec!(1)), None);
        let b = product(Money::new(dec!(1), "USD"), None);
        let m = Size::new("M").unwrap();
        let res = snapshot(
            &[LineRequest { product: &a, size: m.clone(), quantity: 1 }, LineRequest { product: &b, size: m, quantity: 1 }],
            &address(),
        );
        assert_matches!(res, Err(EcommerceError::InvalidInput(_)));
    }
}
