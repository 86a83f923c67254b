mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::World;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront::api::{self, AppState, USER_HEADER};
use storefront::domain::aggregates::StockLevels;
use storefront::payments::Payments;
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN: &str = "admin-secret";

async fn app() -> (World, Router) {
    let w = World::new(Payments::demo()).await;
    let router = api::router(AppState::new(w.services.clone(), Some(ADMIN.to_string())));
    (w, router)
}

async fn call(router: &Router, method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        req = req.header(USER_HEADER, user.to_string());
    }
    if uri.starts_with("/api/v1/admin") {
        req = req.header(header::AUTHORIZATION, format!("Bearer {ADMIN}"));
    }
    let req = match body {
        Some(body) => req.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (_, router) = app().await;
    let (status, body) = call(&router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_checkout_over_http() {
    let (w, router) = app().await;
    let product = w.product("Pathani", dec!(500), StockLevels::Aggregate(10), &["M"]).await;
    let user = Some(w.user);

    let (status, line) =
        call(&router, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": product.id, "size": "M", "quantity": 2}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(line["quantity"], 2);

    let (status, cart) = call(&router, "GET", "/api/v1/cart", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 2);

    let (status, receipt) = call(&router, "POST", "/api/v1/checkout/cart", user, Some(json!({"address_id": w.address_id}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["is_demo"], true);
    assert_eq!(receipt["order"]["status"], "pending");
    assert_eq!(receipt["transaction"]["status"], "pending");
    let code = receipt["transaction"]["code"].as_str().unwrap().to_string();
    let order_id = receipt["order"]["id"].as_str().unwrap().to_string();

    let confirm = json!({"transaction_code": code, "proof": {"mode": "demo", "method": "COD"}});
    let (status, confirmation) = call(&router, "POST", "/api/v1/payments/confirm", user, Some(confirm)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmation["order"]["status"], "confirmed");
    assert_eq!(confirmation["transaction"]["method"], "COD");

    let (status, txn) = call(&router, "GET", &format!("/api/v1/orders/{order_id}/transaction"), user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(txn["status"], "success");

    let (status, err) = call(&router, "GET", &format!("/api/v1/orders/{order_id}"), Some(Uuid::now_v7()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"], "not_found");
}

#[tokio::test]
async fn test_error_bodies() {
    let (w, router) = app().await;
    let product = w.product("Dupatta", dec!(300), StockLevels::Aggregate(1), &["FREE"]).await;
    let user = Some(w.user);

    let (status, err) = call(&router, "GET", "/api/v1/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"], "unauthorized");

    let (status, err) =
        call(&router, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": product.id, "size": "FREE", "quantity": 2}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"], "insufficient_stock");

    let (status, err) = call(&router, "POST", "/api/v1/cart/items", user, Some(json!({"size": "FREE"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_input");

    let bad_phone = json!({
        "name": "Home", "phone": "555", "address_line1": "1 Road", "city": "Pune", "state": "MH", "pincode": "411001"
    });
    let (status, err) = call(&router, "POST", "/api/v1/addresses", user, Some(bad_phone)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_input");
}

#[tokio::test]
async fn test_admin_routes() {
    let (w, router) = app().await;

    let unauthorized = Request::builder().uri("/api/v1/admin/orders").body(Body::empty()).unwrap();
    assert_eq!(router.clone().oneshot(unauthorized).await.unwrap().status(), StatusCode::FORBIDDEN);

    let new_product = json!({
        "name": "Bandhgala", "category": "MEN'S COLLECTION", "price": "4999.00", "sizes": ["M", "L"],
        "stock": {"per_size": {"M": 2, "L": 1}}
    });
    let (status, product) = call(&router, "POST", "/api/v1/admin/products", None, Some(new_product)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(product["stock"], 3);
    let product_id = product["id"].as_str().unwrap().to_string();

    let buy = json!({"product_id": product_id, "quantity": 1, "size": "L", "address_id": w.address_id});
    let (status, receipt) = call(&router, "POST", "/api/v1/checkout/buy-now", Some(w.user), Some(buy)).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = receipt["order"]["id"].as_str().unwrap().to_string();

    let (status, availability) = call(&router, "GET", &format!("/api/v1/products/{product_id}/availability?size=l"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability["size"], "L");
    assert_eq!(availability["available"], 0);

    let (status, order) =
        call(&router, "PUT", &format!("/api/v1/admin/orders/{order_id}/status"), None, Some(json!({"status": "cancelled"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "cancelled");

    let (status, detail) = call(&router, "GET", &format!("/api/v1/admin/orders/{order_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["transaction"]["status"], "failed");

    let (status, err) =
        call(&router, "PUT", &format!("/api/v1/admin/orders/{order_id}/status"), None, Some(json!({"status": "shipped"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"], "conflict");

    let (status, transactions) = call(&router, "GET", "/api/v1/admin/transactions", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transactions.as_array().unwrap().len(), 1);
    assert_eq!(transactions[0]["status"], "failed");

    let (status, dashboard) = call(&router, "GET", "/api/v1/admin/dashboard", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["products"], 1);
    assert_eq!(dashboard["orders"], 1);
    assert_eq!(dashboard["transactions"], 1);
    assert_eq!(dashboard["low_stock_count"], 1);
    assert_eq!(dashboard["low_stock_products"][0]["stock"], 3);
    assert_eq!(dashboard["recent_orders"][0]["id"], order_id.as_str());

    let (status, restocked) =
        call(&router, "PUT", &format!("/api/v1/admin/products/{product_id}/stock"), None, Some(json!({"aggregate": 7}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restocked["stock"], 7);
}
