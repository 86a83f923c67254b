#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::Arc;
use storefront::bus::EventBus;
use storefront::domain::aggregates::{NewAddress, Product, StockLevels};
use storefront::domain::value_objects::{Money, Size};
use storefront::payments::Payments;
use storefront::services::{ServiceSettings, Services};
use storefront::store::{MemoryStore, Store};
use uuid::Uuid;

pub struct World {
    pub store: Arc<MemoryStore>,
    pub bus: EventBus,
    pub services: Services,
    pub user: Uuid,
    pub address_id: Uuid,
}

impl World {
    pub async fn new(payments: Payments) -> Self {
        Self::with_settings(payments, ServiceSettings::default()).await
    }

    pub async fn with_settings(payments: Payments, settings: ServiceSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::in_memory();
        let services = Services::new(store.clone(), payments, bus.clone(), settings);
        let user = Uuid::now_v7();
        let address_id = services.addresses.add(user, address("Home", true)).await.unwrap().id;
        Self { store, bus, services, user, address_id }
    }

    pub async fn product(&self, name: &str, price: Decimal, levels: StockLevels, sizes: &[&str]) -> Product {
        let sizes = sizes.iter().map(|s| Size::new(*s).unwrap()).collect();
        let mut product = Product::create(name, "MEN'S COLLECTION", Money::inr(price), sizes);
        product.images = vec![format!("/uploads/{}.jpg", name.to_lowercase())];
        product.set_levels(levels).unwrap();
        self.store.save_product(&product).await.unwrap();
        product
    }

    pub async fn stock_of(&self, product_id: Uuid) -> u32 {
        self.store.product(product_id).await.unwrap().unwrap().stock()
    }

    pub async fn available(&self, product_id: Uuid, size: &str) -> u32 {
        self.store.product(product_id).await.unwrap().unwrap().available(&Size::new(size).unwrap())
    }
}

pub fn address(name: &str, is_default: bool) -> NewAddress {
    NewAddress {
        name: name.into(),
        phone: "9876543210".into(),
        address_line1: "221 Residency Road".into(),
        address_line2: Some("Near Metro".into()),
        city: "Bengaluru".into(),
        state: "Karnataka".into(),
        pincode: "560025".into(),
        is_default,
    }
}
