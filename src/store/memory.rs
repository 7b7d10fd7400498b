//! In-process store.
//!
//! One `tokio::sync::Mutex` guards every table, so each `Store` call is a
//! serialized unit of work. Multi-step writes stage on a copy of the tables
//! and only replace the live copy once every step has succeeded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use super::{apply_cart_command, apply_step, CartChange, CartCommand, CheckoutContext, FulfillmentStep, PaymentAbandonment, PaymentConfirmation, ProductFilter, Store};
use crate::domain::aggregates::{Cart, CartItem, Category, Order, OrderItem, OrderStatus, PaymentOutcome, Product, ShippingInfo};
use crate::domain::value_objects::{OrderId, ProductId, UserId};
use crate::{EcommerceError, Result};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: Tables,
    checkout_fault: Option<CheckoutFault>,
}

/// Failure to inject into the next `place_order`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutFault {
    /// Fail after this many order item rows were written.
    AfterItems(usize),
    /// Fail when recording the checkout context, after every other write.
    SessionWrite,
}

#[derive(Clone, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    categories: HashMap<Uuid, Category>,
    carts: HashMap<UserId, CartRow>,
    orders: HashMap<OrderId, OrderRow>,
    order_items: HashMap<OrderId, Vec<OrderItem>>,
    sessions: HashMap<UserId, CheckoutContext>,
}

#[derive(Clone)]
struct CartRow { lines: Vec<(ProductId, u32)>, updated_at: DateTime<Utc> }

#[derive(Clone)]
struct OrderRow {
    id: OrderId, user_id: UserId, shipping: ShippingInfo, paid: bool, transaction_id: Option<String>,
    status: OrderStatus, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn from_order(o: &Order) -> Self {
        Self {
            id: o.id(), user_id: o.user_id(), shipping: o.shipping().clone(), paid: o.is_paid(),
            transaction_id: o.transaction_id().map(str::to_string), status: o.status(),
            created_at: o.created_at(), updated_at: o.updated_at(),
        }
    }
}

impl Tables {
    fn cart(&self, user: UserId) -> Cart {
        let Some(row) = self.carts.get(&user) else { return Cart::new(user) };
        let items = row.lines.iter()
            .filter_map(|(id, quantity)| self.products.get(id).map(|p| CartItem {
                product_id: *id, name: p.name().to_string(), unit_price: p.price(), quantity: *quantity,
            }))
            .collect();
        Cart::restore(user, items, row.updated_at)
    }

    fn save_cart(&mut self, cart: &Cart) {
        let lines = cart.items().iter().map(|i| (i.product_id, i.quantity)).collect();
        self.carts.insert(cart.user_id(), CartRow { lines, updated_at: cart.updated_at() });
    }

    fn order(&self, id: OrderId) -> Option<Order> {
        let r = self.orders.get(&id)?;
        let items = self.order_items.get(&id).cloned().unwrap_or_default();
        Some(Order::restore(r.id, r.user_id, r.shipping.clone(), r.paid, r.transaction_id.clone(), r.status, items, r.created_at, r.updated_at))
    }

    fn owned_order(&self, user: UserId, id: OrderId) -> Result<Order> {
        let order = self.order(id).ok_or(EcommerceError::NotFound("Order"))?;
        if !order.is_owned_by(user) { return Err(EcommerceError::Unauthorized); }
        Ok(order)
    }
}

fn injected(order_id: OrderId) -> EcommerceError {
    warn!(order_id = %order_id, "injected checkout fault, rolling back");
    EcommerceError::StorageError("injected checkout fault".into())
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Makes the next `place_order` fail part-way, to exercise rollback.
    pub async fn inject_checkout_fault(&self, fault: CheckoutFault) {
        self.inner.lock().await.checkout_fault = Some(fault);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.inner.lock().await.tables.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let inner = self.inner.lock().await;
        let mut products: Vec<&Product> = inner.tables.products.values().filter(|p| filter.matches(p)).collect();
        products.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        Ok(products.into_iter().skip(offset).take(filter.limit() as usize).cloned().collect())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.inner.lock().await.tables.products.insert(product.id(), product.clone());
        Ok(())
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        let inner = self.inner.lock().await;
        let mut categories: Vec<Category> = inner.tables.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn category(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.inner.lock().await.tables.categories.get(&id).cloned())
    }

    async fn upsert_category(&self, category: &Category) -> Result<()> {
        self.inner.lock().await.tables.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn cart(&self, user: UserId) -> Result<Cart> {
        let mut inner = self.inner.lock().await;
        let cart = inner.tables.cart(user);
        if !inner.tables.carts.contains_key(&user) { inner.tables.save_cart(&cart); }
        Ok(cart)
    }

    async fn mutate_cart(&self, user: UserId, product_id: ProductId, command: CartCommand) -> Result<CartChange> {
        let mut inner = self.inner.lock().await;
        let tables = &mut inner.tables;
        let mut cart = tables.cart(user);
        let product = tables.products.get(&product_id).cloned();
        let change = apply_cart_command(&mut cart, product.as_ref(), product_id, command)?;
        tables.save_cart(&cart);
        Ok(change)
    }

    async fn place_order(&self, user: UserId, shipping: ShippingInfo) -> Result<Order> {
        let mut inner = self.inner.lock().await;
        let fault = inner.checkout_fault.take();
        let mut staged = inner.tables.clone();

        let mut cart = staged.cart(user);
        let order = Order::place(user, shipping, &cart)?;
        staged.orders.insert(order.id(), OrderRow::from_order(&order));
        let rows = staged.order_items.entry(order.id()).or_default();
        for item in order.items() {
            if fault == Some(CheckoutFault::AfterItems(rows.len())) {
                return Err(injected(order.id()));
            }
            rows.push(item.clone());
        }
        cart.clear();
        staged.save_cart(&cart);
        if fault == Some(CheckoutFault::SessionWrite) {
            return Err(injected(order.id()));
        }
        staged.sessions.insert(user, CheckoutContext::new(user, order.id()));

        inner.tables = staged;
        debug!(order_id = %order.id(), items = order.items().len(), "order committed");
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.lock().await.tables.order(id))
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner.tables.orders.values()
            .filter(|r| r.user_id == user)
            .filter_map(|r| inner.tables.order(r.id))
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn confirm_payment(&self, user: UserId, id: OrderId) -> Result<PaymentConfirmation> {
        let mut inner = self.inner.lock().await;
        let tables = &mut inner.tables;
        let mut order = tables.owned_order(user, id)?;
        let outcome = order.confirm_payment()?;
        if outcome == PaymentOutcome::Confirmed {
            for item in order.items() {
                match tables.products.get_mut(&item.product_id) {
                    Some(p) => p.sell(u64::from(item.quantity)),
                    None => warn!(product_id = %item.product_id, "sold product no longer in catalog"),
                }
            }
            tables.orders.insert(id, OrderRow::from_order(&order));
        }
        Ok(PaymentConfirmation { order, outcome })
    }

    async fn abandon_payment(&self, user: UserId, id: OrderId) -> Result<PaymentAbandonment> {
        let mut inner = self.inner.lock().await;
        let tables = &mut inner.tables;
        let mut order = tables.owned_order(user, id)?;
        let outcome = order.abandon_payment()?;
        tables.orders.insert(id, OrderRow::from_order(&order));
        Ok(PaymentAbandonment { order, outcome })
    }

    async fn advance_order(&self, id: OrderId, step: FulfillmentStep) -> Result<Order> {
        let mut inner = self.inner.lock().await;
        let tables = &mut inner.tables;
        let mut order = tables.order(id).ok_or(EcommerceError::NotFound("Order"))?;
        apply_step(&mut order, step)?;
        tables.orders.insert(id, OrderRow::from_order(&order));
        Ok(order)
    }

    async fn checkout_context(&self, user: UserId) -> Result<Option<CheckoutContext>> {
        Ok(self.inner.lock().await.tables.sessions.get(&user).copied())
    }
}
