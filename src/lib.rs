//! ShopNest storefront
//!
//! Cart, checkout and payment hand-off for a single-gateway online shop.
//!
//! ## Features
//! - Per-user carts with stock-checked quantities
//! - Atomic checkout into immutable order snapshots
//! - SSLCommerz redirect-and-callback payment integration
//! - Idempotent payment confirmation with at-most-once stock decrement
//! - Order history and status lifecycle

pub mod checkout;
pub mod config;
pub mod domain;
pub mod fulfillment;
pub mod http;
pub mod notify;
pub mod payment;
pub mod store;
pub mod telemetry;

use thiserror::Error;
use domain::aggregates::{CartError, OrderError, OrderStatus};
use domain::value_objects::ProductId;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: ProductId, requested: u64, available: u64 },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid checkout details: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

impl From<CartError> for EcommerceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::InsufficientStock { product_id, requested, available } => Self::InsufficientStock { product_id, requested, available },
            CartError::ItemNotFound => Self::NotFound("Cart item"),
        }
    }
}

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::EmptyCart => Self::EmptyCart,
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            OrderError::UnknownStatus(s) => Self::StorageError(format!("unknown order status '{s}'")),
        }
    }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(e: sqlx::Error) -> Self { Self::StorageError(e.to_string()) }
}

impl From<sqlx::migrate::MigrateError> for EcommerceError {
    fn from(e: sqlx::migrate::MigrateError) -> Self { Self::StorageError(e.to_string()) }
}
