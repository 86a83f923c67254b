//! Payment Transaction Aggregate
//!
//! Opened `pending` together with its order; settles to `success` or
//! `failed` exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::order::Order;
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::domain::value_objects::{Money, TransactionCode};

pub const DEMO_METHOD: &str = "Demo";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub code: TransactionCode,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub order_code: String,
    pub amount: Money,
    pub channel: PaymentChannel,
    pub method: String,
    pub status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

/// Whether the transaction was opened against the real gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel { Gateway, Demo }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Success, Failed }

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Gateway => "gateway", Self::Demo => "demo" }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Success => "success", Self::Failed => "failed" }
    }
}

impl FromStr for PaymentChannel {
    type Err = TransactionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(Self::Gateway),
            "demo" => Ok(Self::Demo),
            other => Err(TransactionError::Unknown(other.to_string())),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = TransactionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(TransactionError::Unknown(other.to_string())),
        }
    }
}

impl Transaction {
    /// `gateway` is the gateway name and its order id when a gateway order
    /// was opened; `None` means demo mode.
    pub fn open(order: &Order, gateway: Option<(&str, String)>) -> Self {
        let now = Utc::now();
        let (channel, method, gateway_order_id) = match gateway {
            Some((name, order_id)) => (PaymentChannel::Gateway, name.to_string(), Some(order_id)),
            None => (PaymentChannel::Demo, DEMO_METHOD.to_string(), None),
        };
        Self {
            id: Uuid::now_v7(), code: TransactionCode::generate(), user_id: order.user_id, order_id: order.id,
            order_code: order.code.to_string(), amount: order.subtotal.clone(), channel, method,
            status: PaymentStatus::Pending, gateway_order_id, gateway_payment_id: None, gateway_signature: None,
            created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }
    pub fn is_pending(&self) -> bool { self.status == PaymentStatus::Pending }

    pub fn settle_with_gateway(&mut self, payment_id: String, signature: String) -> Result<(), TransactionError> {
        self.ensure_pending()?;
        self.gateway_payment_id = Some(payment_id);
        self.gateway_signature = Some(signature);
        self.succeed();
        Ok(())
    }

    /// Demo settlement records the shopper's chosen label (UPI, Card, COD, ...).
    pub fn settle_demo(&mut self, method: Option<String>) -> Result<(), TransactionError> {
        self.ensure_pending()?;
        self.method = method.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()).unwrap_or_else(|| DEMO_METHOD.to_string());
        self.succeed();
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), TransactionError> {
        self.ensure_pending()?;
        self.status = PaymentStatus::Failed;
        self.touch();
        self.raise_event(DomainEvent::Payment(PaymentEvent::Failed { transaction_code: self.code.to_string(), order_id: self.order_id }));
        Ok(())
    }

    fn succeed(&mut self) {
        self.status = PaymentStatus::Success;
        self.touch();
        self.raise_event(DomainEvent::Payment(PaymentEvent::Confirmed {
            transaction_code: self.code.to_string(), order_id: self.order_id, method: self.method.clone(),
        }));
    }

    fn ensure_pending(&self) -> Result<(), TransactionError> {
        if self.is_pending() { Ok(()) } else { Err(TransactionError::AlreadySettled(self.status)) }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum TransactionError { AlreadySettled(PaymentStatus), Unknown(String) }
impl std::error::Error for TransactionError {}
impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySettled(status) => write!(f, "Transaction already {}", status.as_str()),
            Self::Unknown(s) => write!(f, "Unknown value {s}"),
        }
    }
}
