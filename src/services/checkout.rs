//! Order/transaction orchestrator.
//!
//! Checkout runs in three phases: validate and price everything up front,
//! open the gateway order (soft-failing to demo mode), then hand the order,
//! its transaction, the stock reservations and the consumed cart lines to the
//! store as one atomic commit. The stock check inside the commit is the
//! authoritative one; the earlier check only gives fast, side-effect-free
//! failures.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::bus::EventBus;
use crate::domain::aggregates::{Order, OrderStatus, PaymentChannel, PaymentStatus, Product, Transaction};
use crate::domain::value_objects::Size;
use crate::payments::{GatewayHandle, Payments};
use crate::pricing::{self, LineRequest};
use crate::stock::{StockLedger, StockMovement};
use crate::store::{CheckoutCommit, OrderTransition, Settlement, Store};
use crate::{EcommerceError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFromCartRequest {
    pub address_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BuyNowRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(length(min = 1, max = 16))]
    pub size: String,
    pub address_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub transaction: Transaction,
    /// Present when a real gateway order was opened.
    pub gateway: Option<GatewayHandle>,
    pub is_demo: bool,
}

/// Proof of payment returned by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaymentProof {
    Gateway { gateway_order_id: String, gateway_payment_id: String, gateway_signature: String },
    /// Simulated payment; `method` is the label the shopper picked (UPI, Card, COD, ...).
    Demo { method: Option<String> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub transaction_code: String,
    pub proof: PaymentProof,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub order: Order,
    pub transaction: Transaction,
    /// True when the transaction had already succeeded before this call.
    pub already_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Accept a demo confirmation for a transaction opened against the gateway.
    pub allow_demo_override: bool,
}

impl Default for CheckoutSettings {
    fn default() -> Self { Self { allow_demo_override: true } }
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    payments: Payments,
    bus: EventBus,
    settings: CheckoutSettings,
}

struct PlannedLine {
    product: Product,
    size: Size,
    quantity: u32,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, payments: Payments, bus: EventBus, settings: CheckoutSettings) -> Self {
        Self { store, payments, bus, settings }
    }

    /// Orders the caller's whole cart. The cart lines are removed in the same
    /// commit that creates the order.
    #[instrument(skip(self, req), fields(address_id = %req.address_id))]
    pub async fn create_from_cart(&self, user_id: Uuid, req: CreateFromCartRequest) -> Result<CheckoutReceipt> {
        let cart = self.store.cart(user_id).await?;
        if cart.is_empty() {
            return Err(EcommerceError::InvalidInput("cart is empty".into()));
        }
        let mut planned = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let product = self.store.product(line.product_id).await?.ok_or_else(|| EcommerceError::product_not_found(line.product_id))?;
            planned.push(PlannedLine { product, size: line.size.clone(), quantity: line.quantity });
        }
        let cart_lines = cart.lines().iter().map(|l| l.id).collect();
        self.place(user_id, req.address_id, planned, cart_lines).await
    }

    /// Orders a single product without touching the cart.
    #[instrument(skip(self, req), fields(product_id = %req.product_id))]
    pub async fn create_buy_now(&self, user_id: Uuid, req: BuyNowRequest) -> Result<CheckoutReceipt> {
        req.validate()?;
        let size = Size::new(req.size)?;
        let product = self.store.product(req.product_id).await?.ok_or_else(|| EcommerceError::product_not_found(req.product_id))?;
        self.place(user_id, req.address_id, vec![PlannedLine { product, size, quantity: req.quantity }], vec![]).await
    }

    async fn place(&self, user_id: Uuid, address_id: Uuid, planned: Vec<PlannedLine>, cart_lines: Vec<Uuid>) -> Result<CheckoutReceipt> {
        let book = self.store.address_book(user_id).await?;
        let address = book.get(address_id).ok_or_else(|| EcommerceError::NotFound(format!("Address {address_id}")))?;

        for line in &planned {
            StockLedger::ensure_available(&line.product, &line.size, line.quantity)?;
        }
        let requests: Vec<LineRequest<'_>> =
            planned.iter().map(|l| LineRequest { product: &l.product, size: l.size.clone(), quantity: l.quantity }).collect();
        let snapshot = pricing::snapshot(&requests, address)?;
        let mut order = Order::place(user_id, snapshot.lines, snapshot.subtotal, snapshot.shipping_address);

        let gateway = self.open_gateway_order(&order).await;
        let mut transaction = Transaction::open(&order, gateway.as_ref().map(|h| (h.gateway.as_str(), h.order.id.clone())));

        let reservations = StockLedger::reservations(&order.lines);
        let mut events = order.take_events();
        events.extend(reservations.iter().map(StockMovement::event));
        events.extend(transaction.take_events());

        let commit = CheckoutCommit { order, transaction, reservations, cart_lines };
        self.store.commit_checkout(&commit).await?;
        let CheckoutCommit { order, transaction, .. } = commit;
        info!(order = %order.code, transaction = %transaction.code, subtotal = %order.subtotal, demo = gateway.is_none(), "order placed");

        self.bus.publish_all(events).await;
        Ok(CheckoutReceipt { is_demo: gateway.is_none(), order, transaction, gateway })
    }

    async fn open_gateway_order(&self, order: &Order) -> Option<GatewayHandle> {
        if !self.payments.is_configured() {
            return None;
        }
        match self.payments.open_order(order.code.as_str(), &order.subtotal).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(order = %order.code, error = %e, "gateway order failed, falling back to demo mode");
                None
            }
        }
    }

    /// Settles a pending transaction and confirms its order.
    ///
    /// Repeating a confirmation for a transaction that already succeeded
    /// returns the current state unchanged. A failed transaction cannot be
    /// confirmed. A signature mismatch fails the transaction and leaves the
    /// order pending.
    #[instrument(skip(self, req), fields(transaction = %req.transaction_code))]
    pub async fn confirm_payment(&self, user_id: Uuid, req: ConfirmPaymentRequest) -> Result<PaymentConfirmation> {
        let mut transaction = self
            .store
            .transaction_by_code(&req.transaction_code)
            .await?
            .filter(|t| t.is_owned_by(user_id))
            .ok_or_else(|| EcommerceError::NotFound(format!("Transaction {}", req.transaction_code)))?;

        match transaction.status {
            PaymentStatus::Success => return self.current_state(transaction).await,
            PaymentStatus::Failed => {
                return Err(EcommerceError::Conflict(format!("transaction {} has failed", transaction.code)));
            }
            PaymentStatus::Pending => {}
        }
        let mut order = self.store.order(transaction.order_id).await?.ok_or_else(|| EcommerceError::order_not_found(transaction.order_id))?;

        match (transaction.channel, req.proof) {
            (PaymentChannel::Gateway, PaymentProof::Gateway { gateway_order_id, gateway_payment_id, gateway_signature }) => {
                let verifier = self
                    .payments
                    .verifier()
                    .ok_or_else(|| EcommerceError::GatewayUnavailable("gateway secret not configured".into()))?;
                let recorded = transaction.gateway_order_id.clone().unwrap_or_default();
                let valid = gateway_order_id == recorded && verifier.verify(&recorded, &gateway_payment_id, &gateway_signature);
                if !valid {
                    return Err(self.reject_signature(transaction).await);
                }
                transaction.settle_with_gateway(gateway_payment_id, gateway_signature)?;
            }
            (PaymentChannel::Gateway, PaymentProof::Demo { method }) => {
                if !self.settings.allow_demo_override {
                    return Err(EcommerceError::InvalidInput("this transaction requires gateway confirmation".into()));
                }
                transaction.settle_demo(method)?;
            }
            (PaymentChannel::Demo, PaymentProof::Demo { method }) => transaction.settle_demo(method)?,
            (PaymentChannel::Demo, PaymentProof::Gateway { .. }) => {
                return Err(EcommerceError::InvalidInput("transaction was opened in demo mode".into()));
            }
        }

        let order_transition = if order.status == OrderStatus::Pending {
            order.confirm()?;
            Some(OrderTransition { order_id: order.id, from: OrderStatus::Pending, to: OrderStatus::Confirmed })
        } else {
            None
        };
        let mut events = transaction.take_events();
        events.extend(order.take_events());

        let settlement = Settlement { transaction, order_transition };
        if !self.store.settle_payment(&settlement).await? {
            // Another confirmation settled it first.
            let current = self
                .store
                .transaction_by_code(&req.transaction_code)
                .await?
                .ok_or_else(|| EcommerceError::NotFound(format!("Transaction {}", req.transaction_code)))?;
            if current.status == PaymentStatus::Success {
                return self.current_state(current).await;
            }
            return Err(EcommerceError::Conflict(format!("transaction {} has failed", current.code)));
        }

        info!(order = %order.code, method = %settlement.transaction.method, "payment confirmed");
        self.bus.publish_all(events).await;
        Ok(PaymentConfirmation { order, transaction: settlement.transaction, already_confirmed: false })
    }

    async fn reject_signature(&self, mut transaction: Transaction) -> EcommerceError {
        warn!(transaction = %transaction.code, "payment signature mismatch");
        if transaction.fail().is_ok() {
            let events = transaction.take_events();
            match self.store.settle_payment(&Settlement { transaction, order_transition: None }).await {
                Ok(true) => self.bus.publish_all(events).await,
                Ok(false) => {}
                Err(e) => return e,
            }
        }
        EcommerceError::InvalidSignature
    }

    async fn current_state(&self, transaction: Transaction) -> Result<PaymentConfirmation> {
        let order = self.store.order(transaction.order_id).await?.ok_or_else(|| EcommerceError::order_not_found(transaction.order_id))?;
        Ok(PaymentConfirmation { order, transaction, already_confirmed: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{NewAddress, StockLevels};
    use crate::domain::value_objects::Money;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryStore>,
        checkout: CheckoutService,
        user: Uuid,
        address_id: Uuid,
        product: Product,
    }

    async fn fixture(stock: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mut product = Product::create("Lehenga", "WOMEN'S COLLECTION", Money::inr(dec!(500)), vec![Size::new("M").unwrap()]);
        product.set_levels(StockLevels::Aggregate(stock)).unwrap();
        store.save_product(&product).await.unwrap();

        let user = Uuid::now_v7();
        let mut book = store.address_book(user).await.unwrap();
        let address_id = book
            .add(NewAddress {
                name: "Meera".into(), phone: "9988776655".into(), address_line1: "4 Lake View".into(), address_line2: None,
                city: "Chennai".into(), state: "TN".into(), pincode: "600001".into(), is_default: true,
            })
            .id;
        store.save_address_book(&book).await.unwrap();

        let checkout = CheckoutService::new(store.clone(), Payments::demo(), EventBus::in_memory(), CheckoutSettings::default());
        Fixture { store, checkout, user, address_id, product }
    }

    fn buy_now(f: &Fixture, quantity: u32) -> BuyNowRequest {
        BuyNowRequest { product_id: f.product.id, quantity, size: "M".into(), address_id: f.address_id }
    }

    #[tokio::test]
    async fn test_buy_now_in_demo_mode() {
        let f = fixture(3).await;
        let receipt = f.checkout.create_buy_now(f.user, buy_now(&f, 2)).await.unwrap();
        assert!(receipt.is_demo);
        assert!(receipt.gateway.is_none());
        assert_eq!(receipt.transaction.amount, receipt.order.subtotal);
        assert_eq!(receipt.order.subtotal, Money::inr(dec!(1000)));
        assert_eq!(f.store.product(f.product.id).await.unwrap().unwrap().stock(), 1);
    }

    #[tokio::test]
    async fn test_checkout_rejects_without_side_effects() {
        let f = fixture(1).await;
        assert_matches!(f.checkout.create_buy_now(f.user, buy_now(&f, 2)).await, Err(EcommerceError::InsufficientStock { .. }));
        let mut req = buy_now(&f, 1);
        req.address_id = Uuid::now_v7();
        assert_matches!(f.checkout.create_buy_now(f.user, req).await, Err(EcommerceError::NotFound(_)));
        assert_matches!(
            f.checkout.create_from_cart(f.user, CreateFromCartRequest { address_id: f.address_id }).await,
            Err(EcommerceError::InvalidInput(_))
        );
        assert_eq!(f.store.product(f.product.id).await.unwrap().unwrap().stock(), 1);
        assert!(f.store.orders_for_user(f.user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_rules() {
        let f = fixture(5).await;
        let receipt = f.checkout.create_buy_now(f.user, buy_now(&f, 1)).await.unwrap();
        let confirm = |method: &str| ConfirmPaymentRequest {
            transaction_code: receipt.transaction.code.to_string(),
            proof: PaymentProof::Demo { method: Some(method.into()) },
        };

        assert_matches!(f.checkout.confirm_payment(Uuid::now_v7(), confirm("UPI")).await, Err(EcommerceError::NotFound(_)));

        let first = f.checkout.confirm_payment(f.user, confirm("UPI")).await.unwrap();
        assert!(!first.already_confirmed);
        assert_eq!(first.order.status, OrderStatus::Confirmed);
        assert_eq!(first.transaction.method, "UPI");

        let again = f.checkout.confirm_payment(f.user, confirm("Card")).await.unwrap();
        assert!(again.already_confirmed);
        assert_eq!(again.transaction.method, "UPI");
        assert_eq!(again.order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_gateway_proof_on_demo_transaction_is_rejected() {
        let f = fixture(5).await;
        let receipt = f.checkout.create_buy_now(f.user, buy_now(&f, 1)).await.unwrap();
        let req = ConfirmPaymentRequest {
            transaction_code: receipt.transaction.code.to_string(),
            proof: PaymentProof::Gateway { gateway_order_id: "o".into(), gateway_payment_id: "p".into(), gateway_signature: "s".into() },
        };
        assert_matches!(f.checkout.confirm_payment(f.user, req).await, Err(EcommerceError::InvalidInput(_)));
        let txn = f.store.transaction_by_code(receipt.transaction.code.as_str()).await.unwrap().unwrap();
        assert_eq!(txn.status, PaymentStatus::Pending);
    }
}
