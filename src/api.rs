//! HTTP front end.
//!
//! Thin axum handlers over [`Services`]. The caller is identified by the
//! `x-user-id` header set by the upstream auth gateway; admin routes require
//! `Authorization: Bearer <ADMIN_TOKEN>`.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;
use uuid::Uuid;

use crate::domain::aggregates::{Address, AddressUpdate, CartLine, NewAddress, Order, Product, StockLevels, Transaction};
use crate::services::cart::{AddItemRequest, CartView, UpdateQuantityRequest};
use crate::services::catalog::{Availability, NewProduct};
use crate::services::checkout::{BuyNowRequest, CheckoutReceipt, ConfirmPaymentRequest, CreateFromCartRequest, PaymentConfirmation};
use crate::services::orders::{Dashboard, OrderDetail, UpdateStatusRequest};
use crate::services::Services;
use crate::EcommerceError;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(services: Services, admin_token: Option<String>) -> Self {
        Self { services, admin_token: admin_token.filter(|t| !t.is_empty()).map(Arc::from) }
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    BadRequest(String),
    Domain(EcommerceError),
}

impl From<EcommerceError> for ApiError {
    fn from(err: EcommerceError) -> Self { Self::Domain(err) }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

fn status_for(err: &EcommerceError) -> StatusCode {
    match err {
        EcommerceError::NotFound(_) => StatusCode::NOT_FOUND,
        EcommerceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EcommerceError::InsufficientStock { .. } | EcommerceError::Conflict(_) => StatusCode::CONFLICT,
        EcommerceError::InvalidSignature => StatusCode::PAYMENT_REQUIRED,
        EcommerceError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        EcommerceError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", format!("missing or invalid {USER_HEADER} header")),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "admin access required".to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "invalid_input", message),
            Self::Domain(EcommerceError::PersistenceFailure(detail)) => {
                error!(%detail, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure", "internal server error".to_string())
            }
            Self::Domain(err) => (status_for(&err), err.kind(), err.to_string()),
        };
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// JSON body whose rejection renders like every other error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

// =============================================================================
// Extractors and guards
// =============================================================================

pub struct CurrentUser(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> ApiResult<Response> {
    let expected = state.admin_token.as_deref().ok_or(ApiError::Forbidden)?;
    let presented = request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer "));
    if presented != Some(expected) {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(request).await)
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/dashboard", get(admin_dashboard))
        .route("/orders", get(admin_orders))
        .route("/orders/:id", get(admin_order))
        .route("/orders/:id/status", put(admin_update_status))
        .route("/transactions", get(admin_transactions))
        .route("/products", post(admin_create_product))
        .route("/products/:id/stock", put(admin_update_stock))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront"})) }))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/products/:id/availability", get(get_availability))
        .route("/api/v1/cart", get(get_cart))
        .route("/api/v1/cart/items", post(add_cart_item))
        .route("/api/v1/cart/items/:id", put(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/addresses", get(list_addresses).post(add_address))
        .route("/api/v1/addresses/:id", put(update_address).delete(remove_address))
        .route("/api/v1/addresses/:id/default", post(set_default_address))
        .route("/api/v1/checkout/cart", post(checkout_cart))
        .route("/api/v1/checkout/buy-now", post(checkout_buy_now))
        .route("/api/v1/payments/confirm", post(confirm_payment))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/transaction", get(get_order_transaction))
        .route("/api/v1/transactions", get(list_transactions))
        .nest("/api/v1/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Catalog and cart
// =============================================================================

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.product(id).await?))
}

#[derive(Deserialize)]
struct AvailabilityQuery {
    size: String,
}

async fn get_availability(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<AvailabilityQuery>,
) -> ApiResult<Json<Availability>> {
    Ok(Json(s.services.catalog.availability(id, &q.size).await?))
}

async fn get_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.carts.get_cart(user).await?))
}

async fn add_cart_item(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(req): AppJson<AddItemRequest>,
) -> ApiResult<(StatusCode, Json<CartLine>)> {
    Ok((StatusCode::CREATED, Json(s.services.carts.add_item(user, req).await?)))
}

async fn update_cart_item(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    AppJson(req): AppJson<UpdateQuantityRequest>,
) -> ApiResult<Response> {
    Ok(match s.services.carts.update_quantity(user, id, req.quantity).await? {
        Some(line) => Json(line).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn remove_cart_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.services.carts.remove_item(user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Address book
// =============================================================================

async fn list_addresses(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<Vec<Address>>> {
    Ok(Json(s.services.addresses.list(user).await?))
}

async fn add_address(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(req): AppJson<NewAddress>,
) -> ApiResult<(StatusCode, Json<Address>)> {
    Ok((StatusCode::CREATED, Json(s.services.addresses.add(user, req).await?)))
}

async fn update_address(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    AppJson(req): AppJson<AddressUpdate>,
) -> ApiResult<Json<Address>> {
    Ok(Json(s.services.addresses.update(user, id, req).await?))
}

async fn remove_address(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.services.addresses.remove(user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_default_address(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Address>>> {
    Ok(Json(s.services.addresses.set_default(user, id).await?))
}

// =============================================================================
// Checkout and payment
// =============================================================================

async fn checkout_cart(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(req): AppJson<CreateFromCartRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutReceipt>)> {
    Ok((StatusCode::CREATED, Json(s.services.checkout.create_from_cart(user, req).await?)))
}

async fn checkout_buy_now(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(req): AppJson<BuyNowRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutReceipt>)> {
    Ok((StatusCode::CREATED, Json(s.services.checkout.create_buy_now(user, req).await?)))
}

async fn confirm_payment(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(req): AppJson<ConfirmPaymentRequest>,
) -> ApiResult<Json<PaymentConfirmation>> {
    Ok(Json(s.services.checkout.confirm_payment(user, req).await?))
}

// =============================================================================
// Order history
// =============================================================================

async fn list_orders(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(s.services.orders.list_orders(user).await?))
}

async fn get_order(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.services.orders.order(user, id).await?))
}

async fn get_order_transaction(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Transaction>> {
    Ok(Json(s.services.orders.order_transaction(user, id).await?))
}

async fn list_transactions(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<Vec<Transaction>>> {
    Ok(Json(s.services.orders.list_transactions(user).await?))
}

// =============================================================================
// Admin
// =============================================================================

async fn admin_dashboard(State(s): State<AppState>) -> ApiResult<Json<Dashboard>> {
    Ok(Json(s.services.orders.dashboard().await?))
}

async fn admin_transactions(State(s): State<AppState>) -> ApiResult<Json<Vec<Transaction>>> {
    Ok(Json(s.services.orders.admin_transactions().await?))
}

async fn admin_orders(State(s): State<AppState>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(s.services.orders.admin_orders().await?))
}

async fn admin_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(s.services.orders.admin_order(id).await?))
}

async fn admin_update_status(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(req): AppJson<UpdateStatusRequest>,
) -> ApiResult<Json<Order>> {
    Ok(Json(s.services.orders.update_status(id, req.status).await?))
}

async fn admin_create_product(State(s): State<AppState>, AppJson(req): AppJson<NewProduct>) -> ApiResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.services.catalog.create_product(req).await?)))
}

async fn admin_update_stock(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(levels): AppJson<StockLevels>,
) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.update_stock(id, levels).await?))
}
