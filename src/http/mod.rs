//! HTTP surface.

pub mod auth;
pub mod error;

use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::config::GatewayConfig;
use crate::domain::aggregates::{CancelOutcome, Cart, Category, Order, OrderStatus, PaymentOutcome, Product, ShippingInfo};
use crate::domain::value_objects::{Money, OrderId, ProductId, UserId};
use crate::notify::Notifier;
use crate::payment::{self, PaymentGateway, PaymentRedirect};
use crate::store::{CartChange, CartCommand, ProductFilter, Store};
use crate::{checkout, fulfillment, EcommerceError};
use auth::CurrentUser;
use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub gateway_config: Arc<GatewayConfig>,
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "shopnest"})) }))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/categories/:id", get(get_category))
        .route("/api/v1/cart", get(get_cart))
        .route("/api/v1/cart/items", post(add_cart_item))
        .route("/api/v1/cart/items/:product_id", put(set_cart_item_quantity).delete(remove_cart_item))
        .route("/api/v1/checkout", post(place_order))
        .route("/api/v1/payment", post(start_payment))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/payment/success/:order_id", get(payment_success).post(payment_success))
        .route("/payment/fail/:order_id", get(payment_fail).post(payment_fail))
        .route("/payment/cancel/:order_id", get(payment_cancel).post(payment_cancel))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

// =============================================================================
// Views
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CartLineView { pub product_id: ProductId, pub name: String, pub unit_price: Money, pub quantity: u32, pub line_total: Money }

#[derive(Debug, Serialize)]
pub struct CartView { pub items: Vec<CartLineView>, pub total_price: Money, pub total_item_count: u64, pub is_empty: bool }

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items().iter().map(|i| CartLineView {
                product_id: i.product_id, name: i.name.clone(), unit_price: i.unit_price, quantity: i.quantity, line_total: i.line_total(),
            }).collect(),
            total_price: cart.total_price(),
            total_item_count: cart.total_item_count(),
            is_empty: cart.is_empty(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartUpdate {
    pub change: CartChange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub cart: CartView,
}

#[derive(Debug, Serialize)]
pub struct OrderLineView { pub product_id: ProductId, pub name: String, pub price: Money, pub quantity: u32, pub line_total: Money }

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub status: OrderStatus,
    pub paid: bool,
    pub transaction_id: Option<String>,
    pub total: Money,
    pub items: Vec<OrderLineView>,
    pub shipping: ShippingInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderView {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id(), status: o.status(), paid: o.is_paid(), transaction_id: o.transaction_id().map(str::to_string),
            total: o.total(),
            items: o.items().iter().map(|i| OrderLineView {
                product_id: i.product_id, name: i.name.clone(), price: i.price, quantity: i.quantity, line_total: i.line_total(),
            }).collect(),
            shipping: o.shipping().clone(), created_at: o.created_at(), updated_at: o.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CallbackView<T: Serialize> { pub outcome: T, pub order: OrderView }

// =============================================================================
// Catalog
// =============================================================================

async fn list_products(State(s): State<AppState>, Query(filter): Query<ProductFilter>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(s.store.list_products(&filter).await?))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    s.store.product(id.into()).await?
        .filter(Product::is_available)
        .map(Json)
        .ok_or(EcommerceError::NotFound("Product").into())
}

async fn list_categories(State(s): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(s.store.categories().await?))
}

async fn get_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Category>> {
    s.store.category(id).await?.map(Json).ok_or(EcommerceError::NotFound("Category").into())
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Deserialize)] pub struct AddItemRequest { pub product_id: Uuid, pub quantity: Option<u32> }
#[derive(Debug, Deserialize)] pub struct SetQuantityRequest { pub quantity: i64 }

async fn get_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<CartView>> {
    Ok(Json(CartView::from(&s.store.cart(user).await?)))
}

async fn apply(s: &AppState, user: UserId, product: ProductId, command: CartCommand) -> ApiResult<Json<CartUpdate>> {
    let change = s.store.mutate_cart(user, product, command).await?;
    let warning = change.warning();
    if let Some(w) = &warning { tracing::warn!(user_id = %user, product_id = %product, warning = %w, "cart quantity clamped"); }
    let cart = s.store.cart(user).await?;
    Ok(Json(CartUpdate { change, warning, cart: CartView::from(&cart) }))
}

async fn add_cart_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, Json(r): Json<AddItemRequest>) -> ApiResult<Json<CartUpdate>> {
    apply(&s, user, r.product_id.into(), CartCommand::Add { quantity: r.quantity.unwrap_or(1) }).await
}

async fn set_cart_item_quantity(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(product_id): Path<Uuid>, Json(r): Json<SetQuantityRequest>) -> ApiResult<Json<CartUpdate>> {
    apply(&s, user, product_id.into(), CartCommand::SetQuantity { quantity: r.quantity }).await
}

async fn remove_cart_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(product_id): Path<Uuid>) -> ApiResult<Json<CartUpdate>> {
    apply(&s, user, product_id.into(), CartCommand::Remove).await
}

// =============================================================================
// Checkout and payment
// =============================================================================

async fn place_order(State(s): State<AppState>, CurrentUser(user): CurrentUser, Json(shipping): Json<ShippingInfo>) -> ApiResult<(StatusCode, Json<OrderView>)> {
    shipping.validate().map_err(|e| EcommerceError::Validation(e.to_string()))?;
    let order = checkout::checkout(s.store.as_ref(), s.notifier.clone(), user, shipping).await?;
    Ok((StatusCode::CREATED, Json(OrderView::from(&order))))
}

async fn start_payment(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<PaymentRedirect>> {
    Ok(Json(payment::pay_for_checkout(s.store.as_ref(), s.gateway.as_ref(), &s.gateway_config, user).await?))
}

async fn payment_success(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<Uuid>) -> ApiResult<Json<CallbackView<PaymentOutcome>>> {
    let c = fulfillment::payment_succeeded(s.store.as_ref(), s.notifier.clone(), user, id.into()).await?;
    Ok(Json(CallbackView { outcome: c.outcome, order: OrderView::from(&c.order) }))
}

async fn payment_fail(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<Uuid>) -> ApiResult<Json<CallbackView<CancelOutcome>>> {
    let a = fulfillment::payment_failed(s.store.as_ref(), s.notifier.clone(), user, id.into()).await?;
    Ok(Json(CallbackView { outcome: a.outcome, order: OrderView::from(&a.order) }))
}

async fn payment_cancel(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<Uuid>) -> ApiResult<Json<CallbackView<CancelOutcome>>> {
    let a = fulfillment::payment_canceled(s.store.as_ref(), s.notifier.clone(), user, id.into()).await?;
    Ok(Json(CallbackView { outcome: a.outcome, order: OrderView::from(&a.order) }))
}

// =============================================================================
// Order history
// =============================================================================

async fn list_orders(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<Vec<OrderView>>> {
    Ok(Json(s.store.orders_for_user(user).await?.iter().map(OrderView::from).collect()))
}

async fn get_order(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(id): Path<Uuid>) -> ApiResult<Json<OrderView>> {
    let order = s.store.order(id.into()).await?.ok_or(EcommerceError::NotFound("Order"))?;
    if !order.is_owned_by(user) { return Err(EcommerceError::Unauthorized.into()); }
    Ok(Json(OrderView::from(&order)))
}
