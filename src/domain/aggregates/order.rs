//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::address::ShippingAddress;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, OrderCode, Size};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub code: OrderCode,
    pub user_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

/// Immutable snapshot of one purchased product/size at its purchase price.
/// `product_id` is kept for display only; the product may later disappear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub size: Size,
    pub image: String,
}

impl OrderLine {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Packed, Shipped, OutForDelivery, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Packed => "packed",
            Self::Shipped => "shipped",
            Self::OutForDelivery => "out-for-delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Packed => Some(2),
            Self::Shipped => Some(3),
            Self::OutForDelivery => Some(4),
            Self::Delivered => Some(5),
            Self::Cancelled => None,
        }
    }

    /// Forward along the progression (steps may be skipped); cancellation only
    /// from pending or confirmed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(_), None) => matches!(self, Self::Pending | Self::Confirmed),
            (Some(from), Some(to)) => to > from,
            (None, _) => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "confirmed" => Self::Confirmed,
            "packed" => Self::Packed,
            "shipped" => Self::Shipped,
            "out-for-delivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            other => return Err(OrderError::UnknownStatus(other.to_string())),
        })
    }
}

impl Order {
    /// Lines must be non-empty and share `subtotal`'s currency; the pricing
    /// engine guarantees both.
    pub fn place(user_id: Uuid, lines: Vec<OrderLine>, subtotal: Money, shipping_address: ShippingAddress) -> Self {
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), code: OrderCode::generate(), user_id, lines, subtotal,
            status: OrderStatus::Pending, shipping_address, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, code: order.code.to_string(), user_id, subtotal: order.subtotal.amount(),
        }));
        order
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }

    pub fn confirm(&mut self) -> Result<(), OrderError> { self.transition(OrderStatus::Confirmed) }

    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        let from = self.status;
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged {
            order_id: self.id, from: from.to_string(), to: next.to_string(),
        }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { InvalidTransition { from: OrderStatus, to: OrderStatus }, UnknownStatus(String) }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
            Self::UnknownStatus(s) => write!(f, "Unknown order status {s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "A".into(), phone: "9876543210".into(), address_line1: "1 Road".into(), address_line2: None,
            city: "Pune".into(), state: "MH".into(), pincode: "411001".into(),
        }
    }

    fn order() -> Order {
        let line = OrderLine {
            product_id: Uuid::now_v7(), name: "Tee".into(), unit_price: Money::inr(Decimal::new(500, 0)),
            quantity: 2, size: Size::new("M").unwrap(), image: String::new(),
        };
        Order::place(Uuid::now_v7(), vec![line], Money::inr(Decimal::new(1000, 0)), address())
    }

    #[test]
    fn test_order_workflow() {
        let mut order = order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.lines[0].line_total(), order.subtotal);
        order.confirm().unwrap();
        order.transition(OrderStatus::Shipped).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert!(order.transition(OrderStatus::Packed).is_err());
        assert!(order.transition(OrderStatus::Cancelled).is_err());
        let events = order.take_events();
        assert_eq!(events.len(), 3);
        assert!(order.take_events().is_empty());
    }

    #[test]
    fn test_cancellation_rules() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Packed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Confirmed));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_status_strings_round_trip() {
        assert_eq!("out-for-delivery".parse::<OrderStatus>().unwrap(), OrderStatus::OutForDelivery);
        assert_eq!(serde_json::to_string(&OrderStatus::OutForDelivery).unwrap(), "\"out-for-delivery\"");
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
