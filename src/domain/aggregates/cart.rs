//! Cart Aggregate
//!
//! One cart per user, created lazily. Every line references a product at most
//! once and never holds more units than the product had in stock when the
//! line was written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::Product;
use crate::domain::value_objects::{Money, ProductId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    user_id: UserId,
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
}

/// A cart line. `unit_price` is the product's current price, refreshed
/// whenever the cart is loaded; it is not a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

/// What `set_item_quantity` actually did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QuantityChange {
    Set { quantity: u32 },
    /// The request exceeded stock; the line now holds `applied` units
    /// (zero means the line was dropped).
    Clamped { requested: u64, applied: u32 },
    Removed,
}

impl QuantityChange {
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Clamped { requested, applied } => Some(format!(
                "Only {applied} in stock; quantity reduced from {requested} to {applied}"
            )),
            _ => None,
        }
    }
}

impl Cart {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, items: vec![], updated_at: Utc::now() }
    }

    pub fn restore(user_id: UserId, items: Vec<CartItem>, updated_at: DateTime<Utc>) -> Self {
        Self { user_id, items, updated_at }
    }

    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> { self.items.iter().find(|i| i.product_id == product_id) }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn total_price(&self) -> Money { self.items.iter().map(CartItem::line_total).sum() }
    pub fn total_item_count(&self) -> u64 { self.items.iter().map(|i| u64::from(i.quantity)).sum() }

    /// Adds `requested` units to an existing line, or starts a new line at one
    /// unit. Rejects the whole change when the result would exceed stock.
    pub fn add_item(&mut self, product: &Product, requested: u32) -> Result<u32, CartError> {
        let stock = product.stock();
        let new_quantity = match self.item(product.id()) {
            Some(existing) => u64::from(existing.quantity) + u64::from(requested),
            None => 1,
        };
        if !stock.covers(new_quantity) {
            return Err(CartError::InsufficientStock { product_id: product.id(), requested: new_quantity, available: stock.value() });
        }
        let new_quantity = u32::try_from(new_quantity).unwrap_or(u32::MAX);
        match self.items.iter_mut().find(|i| i.product_id == product.id()) {
            Some(existing) => {
                existing.quantity = new_quantity;
                refresh(existing, product);
            }
            None => self.items.push(CartItem {
                product_id: product.id(), name: product.name().to_string(), unit_price: product.price(), quantity: new_quantity,
            }),
        }
        self.touch();
        Ok(new_quantity)
    }

    /// Sets a line to exactly `quantity`. Non-positive removes the line;
    /// anything above stock is clamped down to stock.
    pub fn set_item_quantity(&mut self, product: &Product, quantity: i64) -> Result<QuantityChange, CartError> {
        if quantity <= 0 {
            self.remove_item(product.id());
            return Ok(QuantityChange::Removed);
        }
        if self.item(product.id()).is_none() {
            return Err(CartError::ItemNotFound);
        }
        let requested = quantity.unsigned_abs();
        let stock = product.stock().value();
        let applied = u32::try_from(requested.min(stock)).unwrap_or(u32::MAX);
        if applied == 0 {
            self.remove_item(product.id());
            return Ok(QuantityChange::Clamped { requested, applied });
        }
        if let Some(line) = self.items.iter_mut().find(|i| i.product_id == product.id()) {
            line.quantity = applied;
            refresh(line, product);
        }
        self.touch();
        if u64::from(applied) < requested {
            Ok(QuantityChange::Clamped { requested, applied })
        } else {
            Ok(QuantityChange::Set { quantity: applied })
        }
    }

    /// Removes the line for `product_id`. Returns whether one was present.
    pub fn remove_item(&mut self, product_id: ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        let removed = self.items.len() != before;
        if removed { self.touch(); }
        removed
    }

    /// Empties the cart, handing back what it held.
    pub fn clear(&mut self) -> Vec<CartItem> {
        self.touch();
        std::mem::take(&mut self.items)
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn refresh(line: &mut CartItem, product: &Product) {
    line.name = product.name().to_string();
    line.unit_price = product.price();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    InsufficientStock { product_id: ProductId, requested: u64, available: u64 },
    ItemNotFound,
}

impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientStock { requested, available, .. } => write!(f, "Insufficient stock: requested {requested}, available {available}"),
            Self::ItemNotFound => write!(f, "Item not in cart"),
        }
    }
}
