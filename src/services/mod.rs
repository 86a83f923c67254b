//! Application services.
//!
//! Exactly one implementation of each operation, written against the
//! [`Store`] trait; the backend is chosen at startup.

pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;

pub use addresses::AddressService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::{CheckoutService, CheckoutSettings};
pub use orders::OrderService;

use chrono::Duration;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::config::AppConfig;
use crate::payments::Payments;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub currency: String,
    pub allow_demo_override: bool,
    pub reservation_ttl: Option<Duration>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { currency: "INR".into(), allow_demo_override: true, reservation_ttl: Some(Duration::minutes(30)) }
    }
}

impl ServiceSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self { currency: cfg.currency.clone(), allow_demo_override: cfg.allow_demo_override, reservation_ttl: cfg.reservation_ttl() }
    }
}

#[derive(Clone)]
pub struct Services {
    pub carts: CartService,
    pub addresses: AddressService,
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, payments: Payments, bus: EventBus, settings: ServiceSettings) -> Self {
        let checkout_settings = CheckoutSettings { allow_demo_override: settings.allow_demo_override };
        Self {
            carts: CartService::new(store.clone(), settings.currency.clone()),
            addresses: AddressService::new(store.clone()),
            catalog: CatalogService::new(store.clone(), settings.currency.clone()),
            checkout: CheckoutService::new(store.clone(), payments, bus.clone(), checkout_settings),
            orders: OrderService::new(store, bus, settings.currency, settings.reservation_ttl),
        }
    }
}
