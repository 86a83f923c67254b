mod common;

use common::World;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use storefront::domain::aggregates::StockLevels;
use storefront::domain::value_objects::Size;
use storefront::payments::Payments;
use storefront::services::cart::AddItemRequest;
use storefront::services::checkout::BuyNowRequest;
use storefront::EcommerceError;
use tokio::task::JoinSet;
use uuid::Uuid;

async fn race(w: &World, product_id: Uuid, size: &str, shoppers: usize) -> (usize, usize) {
    let mut attempts = JoinSet::new();
    for _ in 0..shoppers {
        let checkout = w.services.checkout.clone();
        let addresses = w.services.addresses.clone();
        let size = size.to_string();
        attempts.spawn(async move {
            let user = Uuid::now_v7();
            let address_id = addresses.add(user, common::address("Home", true)).await.unwrap().id;
            checkout.create_buy_now(user, BuyNowRequest { product_id, quantity: 1, size, address_id }).await
        });
    }
    let mut results = Vec::with_capacity(shoppers);
    while let Some(joined) = attempts.join_next().await {
        results.push(joined.expect("checkout task panicked"));
    }
    let won = results.iter().filter(|r| r.is_ok()).count();
    let out_of_stock = results.iter().filter(|r| matches!(r, Err(EcommerceError::InsufficientStock { .. }))).count();
    (won, out_of_stock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_checkouts_never_oversell() {
    let w = World::new(Payments::demo()).await;
    let product = w.product("Limited Kurta", dec!(999), StockLevels::Aggregate(5), &["M"]).await;

    let (won, out_of_stock) = race(&w, product.id, "M", 20).await;
    assert_eq!(won, 5);
    assert_eq!(out_of_stock, 15);
    assert_eq!(w.stock_of(product.id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_checkouts_on_one_variant() {
    let w = World::new(Payments::demo()).await;
    let levels = StockLevels::PerSize(BTreeMap::from([(Size::new("S").unwrap(), 3), (Size::new("M").unwrap(), 4)]));
    let product = w.product("Festive Tee", dec!(399), levels, &["S", "M"]).await;

    let (won, out_of_stock) = race(&w, product.id, "S", 12).await;
    assert_eq!(won, 3);
    assert_eq!(out_of_stock, 9);
    assert_eq!(w.available(product.id, "S").await, 0);
    assert_eq!(w.available(product.id, "M").await, 4);
    assert_eq!(w.stock_of(product.id).await, 4);
}

async fn add_in_parallel(w: &World, product_id: Uuid, adds: usize) -> usize {
    let mut attempts = JoinSet::new();
    for _ in 0..adds {
        let carts = w.services.carts.clone();
        let user = w.user;
        attempts.spawn(async move {
            carts.add_item(user, AddItemRequest { product_id, size: "M".into(), quantity: 1 }).await
        });
    }
    let mut added = 0;
    while let Some(joined) = attempts.join_next().await {
        match joined.expect("add task panicked") {
            Ok(_) => added += 1,
            Err(e) => assert!(matches!(e, EcommerceError::InsufficientStock { .. }), "unexpected error: {e}"),
        }
    }
    added
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_adds_merge_into_one_line() {
    let w = World::new(Payments::demo()).await;
    let product = w.product("Nehru Jacket", dec!(1499), StockLevels::Aggregate(100), &["M"]).await;

    assert_eq!(add_in_parallel(&w, product.id, 20).await, 20);
    let cart = w.services.carts.get_cart(w.user).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].line.quantity, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_adds_stop_at_stock() {
    let w = World::new(Payments::demo()).await;
    let product = w.product("Silk Stole", dec!(799), StockLevels::Aggregate(5), &["M"]).await;

    assert_eq!(add_in_parallel(&w, product.id, 20).await, 5);
    let cart = w.services.carts.get_cart(w.user).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].line.quantity, 5);
    assert_eq!(w.stock_of(product.id).await, 5);
}
