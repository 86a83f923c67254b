//! Domain events
use crate::domain::value_objects::Size;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "area", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Payment(PaymentEvent),
    Stock(StockEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, code: String, user_id: Uuid, subtotal: Decimal },
    StatusChanged { order_id: Uuid, from: String, to: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Confirmed { transaction_code: String, order_id: Uuid, method: String },
    Failed { transaction_code: String, order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    Reserved { product_id: Uuid, size: Size, quantity: u32 },
    Released { product_id: Uuid, size: Size, quantity: u32 },
}

impl DomainEvent {
    /// NATS subject, e.g. `storefront.order.placed`.
    pub fn subject(&self) -> String {
        let (area, name) = match self {
            Self::Order(OrderEvent::Placed { .. }) => ("order", "placed"),
            Self::Order(OrderEvent::StatusChanged { .. }) => ("order", "status_changed"),
            Self::Payment(PaymentEvent::Confirmed { .. }) => ("payment", "confirmed"),
            Self::Payment(PaymentEvent::Failed { .. }) => ("payment", "failed"),
            Self::Stock(StockEvent::Reserved { .. }) => ("stock", "reserved"),
            Self::Stock(StockEvent::Released { .. }) => ("stock", "released"),
        };
        format!("storefront.{area}.{name}")
    }
}
