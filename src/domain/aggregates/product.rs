//! Product Aggregate
//!
//! Owned by the catalog. Carts and orders only read it; the one write the
//! checkout workflow performs is the floored stock decrement on payment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, ProductId, Stock};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    slug: String,
    category_id: Option<Uuid>,
    description: String,
    price: Money,
    stock: Stock,
    available: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(name: impl Into<String>, price: Money, stock: u64) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: ProductId::new(), slug: slugify(&name), name, category_id: None, description: String::new(),
            price, stock: Stock::new(stock), available: true, created_at: now, updated_at: now,
        }
    }

    /// Rebuilds a product from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: ProductId, name: String, slug: String, category_id: Option<Uuid>, description: String,
        price: Money, stock: Stock, available: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, name, slug, category_id, description, price, stock, available, created_at, updated_at }
    }

    pub fn with_category(mut self, category_id: Uuid) -> Self { self.category_id = Some(category_id); self }

    pub fn id(&self) -> ProductId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn slug(&self) -> &str { &self.slug }
    pub fn category_id(&self) -> Option<Uuid> { self.category_id }
    pub fn description(&self) -> &str { &self.description }
    pub fn price(&self) -> Money { self.price }
    pub fn stock(&self) -> Stock { self.stock }
    pub fn is_available(&self) -> bool { self.available }
    pub fn is_in_stock(&self) -> bool { !self.stock.is_zero() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn update_price(&mut self, new_price: Money) { self.price = new_price; self.touch(); }
    pub fn set_available(&mut self, available: bool) { self.available = available; self.touch(); }
    pub fn restock(&mut self, qty: u64) { self.stock = self.stock.add(qty); self.touch(); }

    /// Applies a confirmed sale. Floors at zero rather than failing.
    pub fn sell(&mut self, qty: u64) {
        self.stock = self.stock.decrement_floored(qty);
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

pub(crate) fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
