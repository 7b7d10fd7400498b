//! Order Aggregate
//!
//! Created once per checkout from a cart. The item snapshot is frozen at
//! creation; afterwards only the payment flag and the status move.
//!
//! ```text
//! pending --(payment success)--> processing --> shipped --> delivered
//! pending --(payment fail/cancel)--> canceled
//! processing --(cancel)--> canceled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;
use crate::domain::aggregates::Cart;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, OrderId, ProductId, UserId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    shipping: ShippingInfo,
    paid: bool,
    transaction_id: Option<String>,
    status: OrderStatus,
    items: Vec<OrderItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

/// Frozen line of an order. `price` is the unit price at checkout time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem { pub product_id: ProductId, pub name: String, pub price: Money, pub quantity: u32 }

impl OrderItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity) }
}

/// Customer and delivery details captured by the checkout form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingInfo {
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 250))]
    pub address: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1))]
    pub note: String,
}

impl ShippingInfo {
    pub fn full_name(&self) -> String { format!("{} {}", self.first_name, self.last_name) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Canceled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Canceled) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "canceled" => Ok(Self::Canceled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// Result of a payment-success callback against the aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// First confirmation: stock must now be decremented.
    Confirmed,
    /// Repeat delivery of the callback; nothing to do.
    AlreadyPaid,
}

/// Result of a payment-fail or payment-cancel callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Canceled,
    AlreadyCanceled,
    /// The order was paid before the callback arrived; it stays paid.
    AlreadyPaid,
}

impl Order {
    /// Snapshots the cart into a new pending, unpaid order.
    pub fn place(user_id: UserId, shipping: ShippingInfo, cart: &Cart) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::EmptyCart); }
        let items = cart.items().iter()
            .map(|line| OrderItem { product_id: line.product_id, name: line.name.clone(), price: line.unit_price, quantity: line.quantity })
            .collect();
        let now = Utc::now();
        let mut order = Self {
            id: OrderId::new(), user_id, shipping, paid: false, transaction_id: None, status: OrderStatus::Pending,
            items, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_id: order.id, user_id, total: order.total() });
        Ok(order)
    }

    /// Rebuilds an order from persisted state.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: OrderId, user_id: UserId, shipping: ShippingInfo, paid: bool, transaction_id: Option<String>,
        status: OrderStatus, items: Vec<OrderItem>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, user_id, shipping, paid, transaction_id, status, items, created_at, updated_at, events: vec![] }
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn shipping(&self) -> &ShippingInfo { &self.shipping }
    pub fn is_paid(&self) -> bool { self.paid }
    pub fn transaction_id(&self) -> Option<&str> { self.transaction_id.as_deref() }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_owned_by(&self, user_id: UserId) -> bool { self.user_id == user_id }

    /// Always derived from the item snapshot.
    pub fn total(&self) -> Money { self.items.iter().map(OrderItem::line_total).sum() }

    /// The `paid: false -> true` transition. Only a pending order can be paid;
    /// a second call is a no-op reported as `AlreadyPaid`.
    pub fn confirm_payment(&mut self) -> Result<PaymentOutcome, OrderError> {
        if self.paid { return Ok(PaymentOutcome::AlreadyPaid); }
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Processing });
        }
        self.paid = true;
        self.status = OrderStatus::Processing;
        self.transaction_id = Some(self.id.to_string());
        self.touch();
        self.raise_event(OrderEvent::PaymentConfirmed {
            order_id: self.id, user_id: self.user_id, transaction_id: self.id.to_string(),
            total: self.total(), email: self.shipping.email.clone(),
        });
        Ok(PaymentOutcome::Confirmed)
    }

    /// Reaction to a failed or user-canceled payment. Leaves `paid` and the
    /// item snapshot alone.
    pub fn abandon_payment(&mut self) -> Result<CancelOutcome, OrderError> {
        if self.paid { return Ok(CancelOutcome::AlreadyPaid); }
        if self.status == OrderStatus::Canceled { return Ok(CancelOutcome::AlreadyCanceled); }
        self.cancel()?;
        Ok(CancelOutcome::Canceled)
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Pending | OrderStatus::Processing) {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Canceled });
        }
        self.status = OrderStatus::Canceled;
        self.touch();
        self.raise_event(OrderEvent::Canceled { order_id: self.id });
        Ok(())
    }

    pub fn ship(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Processing, OrderStatus::Shipped)?;
        self.raise_event(OrderEvent::Shipped { order_id: self.id });
        Ok(())
    }

    pub fn deliver(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Shipped, OrderStatus::Delivered)?;
        self.raise_event(OrderEvent::Delivered { order_id: self.id });
        Ok(())
    }

    fn transition(&mut self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if self.status != from { return Err(OrderError::InvalidTransition { from: self.status, to }); }
        self.status = to;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { EmptyCart, InvalidTransition { from: OrderStatus, to: OrderStatus }, UnknownStatus(String) }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCart => write!(f, "Cart is empty"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
            Self::UnknownStatus(s) => write!(f, "Unknown order status '{s}'"),
        }
    }
}
