//! Persistence seam.
//!
//! Every operation that must be all-or-nothing is a single `Store` method, so
//! each backend can run it inside one unit of work: the in-memory store under
//! one lock, Postgres inside one transaction.

mod memory;
mod postgres;

pub use memory::{CheckoutFault, MemoryStore};
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::{Cart, CancelOutcome, Category, Order, PaymentOutcome, Product, QuantityChange, ShippingInfo};
use crate::domain::value_objects::{Money, OrderId, ProductId, UserId};
use crate::Result;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Typed catalog query. Unset fields do not filter. Results are newest first,
/// one page at a time.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<Uuid>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductFilter {
    /// Page size, clamped to `1..=MAX_PER_PAGE`.
    pub fn limit(&self) -> u32 { self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE) }

    /// Rows to skip; pages start at 1.
    pub fn offset(&self) -> u64 { u64::from(self.page.unwrap_or(1).max(1) - 1) * u64::from(self.limit()) }

    pub fn matches(&self, p: &Product) -> bool {
        p.is_available()
            && self.category.map_or(true, |c| p.category_id() == Some(c))
            && self.min_price.map_or(true, |m| p.price() >= m)
            && self.max_price.map_or(true, |m| p.price() <= m)
    }
}

/// A cart write, applied against the product row as it is at write time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CartCommand {
    Add { quantity: u32 },
    SetQuantity { quantity: i64 },
    Remove,
}

/// What a `CartCommand` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum CartChange {
    Added { quantity: u32 },
    Quantity(QuantityChange),
    Removed { was_present: bool },
}

impl CartChange {
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Quantity(q) => q.warning(),
            _ => None,
        }
    }
}

/// Capability recorded by checkout and consumed by the payment step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutContext {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
}

impl CheckoutContext {
    pub fn new(user_id: UserId, order_id: OrderId) -> Self { Self { user_id, order_id, created_at: Utc::now() } }
}

/// Outcome of the payment-success transition, with the order as stored after it.
#[derive(Clone, Debug)]
pub struct PaymentConfirmation { pub order: Order, pub outcome: PaymentOutcome }

#[derive(Clone, Debug)]
pub struct PaymentAbandonment { pub order: Order, pub outcome: CancelOutcome }

/// Order status moves driven by fulfillment staff, outside the payment flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FulfillmentStep { Ship, Deliver, Cancel }

#[async_trait]
pub trait Store: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Option<Product>>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;
    /// Catalog write used by seeding and admin tooling.
    async fn upsert_product(&self, product: &Product) -> Result<()>;

    /// All categories, ordered by name.
    async fn categories(&self) -> Result<Vec<Category>>;
    async fn category(&self, id: Uuid) -> Result<Option<Category>>;
    async fn upsert_category(&self, category: &Category) -> Result<()>;

    /// The user's cart priced at current product prices, created if missing.
    async fn cart(&self, user: UserId) -> Result<Cart>;
    /// Applies `command` to the user's cart. Fails with `NotFound` for an
    /// unknown product (or an unavailable one, when adding).
    async fn mutate_cart(&self, user: UserId, product: ProductId, command: CartCommand) -> Result<CartChange>;

    /// Creates the order, snapshots the items, empties the cart and records
    /// the order as the user's [`CheckoutContext`], all or nothing.
    async fn place_order(&self, user: UserId, shipping: ShippingInfo) -> Result<Order>;
    async fn order(&self, id: OrderId) -> Result<Option<Order>>;
    /// Newest first.
    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>>;

    /// Flips `paid` from false to true for an order owned by `user` and, only
    /// on that flip, decrements stock for every item (floored at zero).
    async fn confirm_payment(&self, user: UserId, id: OrderId) -> Result<PaymentConfirmation>;
    /// Cancels an unpaid order owned by `user`. Stock is not touched.
    async fn abandon_payment(&self, user: UserId, id: OrderId) -> Result<PaymentAbandonment>;
    async fn advance_order(&self, id: OrderId, step: FulfillmentStep) -> Result<Order>;

    async fn checkout_context(&self, user: UserId) -> Result<Option<CheckoutContext>>;
}

/// Applies a fulfillment step to a loaded order.
pub(crate) fn apply_step(order: &mut Order, step: FulfillmentStep) -> Result<()> {
    match step {
        FulfillmentStep::Ship => order.ship()?,
        FulfillmentStep::Deliver => order.deliver()?,
        FulfillmentStep::Cancel => order.cancel()?,
    }
    Ok(())
}

/// Applies a cart command to a loaded cart and product.
pub(crate) fn apply_cart_command(cart: &mut Cart, product: Option<&Product>, product_id: ProductId, command: CartCommand) -> Result<CartChange> {
    use crate::EcommerceError;
    match (command, product) {
        (CartCommand::Remove, _) => Ok(CartChange::Removed { was_present: cart.remove_item(product_id) }),
        (CartCommand::Add { quantity }, Some(p)) if p.is_available() => {
            Ok(CartChange::Added { quantity: cart.add_item(p, quantity)? })
        }
        (CartCommand::SetQuantity { quantity }, Some(p)) => Ok(CartChange::Quantity(cart.set_item_quantity(p, quantity)?)),
        _ => Err(EcommerceError::NotFound("Product")),
    }
}
