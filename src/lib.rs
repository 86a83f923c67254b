//! Storefront order pipeline
//!
//! Turns a shopper's cart into a priced order, reserves stock, opens a
//! payment-gateway order and later reconciles the payment confirmation.
//!
//! ## Features
//! - Cart management validated against live stock
//! - Variant-aware stock ledger with atomic reservation
//! - Frozen order snapshots (prices and shipping address)
//! - Razorpay-style gateway with automatic demo-mode fallback
//! - HMAC-SHA256 payment confirmation
//! - Admin order status management and reservation expiry

pub mod api;
pub mod bus;
pub mod config;
pub mod domain;
pub mod payments;
pub mod pricing;
pub mod services;
pub mod stock;
pub mod store;

use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: u32,
        available: u32,
    },

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    PersistenceFailure(String),
}

impl EcommerceError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::InvalidSignature => "invalid_signature",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::Conflict(_) => "conflict",
            Self::PersistenceFailure(_) => "persistence_failure",
        }
    }

    pub(crate) fn order_not_found(id: Uuid) -> Self {
        Self::NotFound(format!("Order {id}"))
    }

    pub(crate) fn product_not_found(id: Uuid) -> Self {
        Self::NotFound(format!("Product {id}"))
    }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EcommerceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for EcommerceError {
    fn from(err: serde_json::Error) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<domain::aggregates::OrderError> for EcommerceError {
    fn from(err: domain::aggregates::OrderError) -> Self {
        match err {
            domain::aggregates::OrderError::UnknownStatus(_) => Self::InvalidInput(err.to_string()),
            domain::aggregates::OrderError::InvalidTransition { .. } => Self::Conflict(err.to_string()),
        }
    }
}

impl From<domain::aggregates::TransactionError> for EcommerceError {
    fn from(err: domain::aggregates::TransactionError) -> Self {
        match err {
            domain::aggregates::TransactionError::AlreadySettled(_) => Self::Conflict(err.to_string()),
            domain::aggregates::TransactionError::Unknown(_) => Self::PersistenceFailure(err.to_string()),
        }
    }
}

impl From<domain::value_objects::SizeError> for EcommerceError {
    fn from(err: domain::value_objects::SizeError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(EcommerceError::InvalidSignature.kind(), "invalid_signature");
        let err = EcommerceError::InsufficientStock { product: "Tee".into(), requested: 3, available: 1 };
        assert_eq!(err.kind(), "insufficient_stock");
        assert_eq!(err.to_string(), "Insufficient stock for Tee: requested 3, available 1");
    }
}
