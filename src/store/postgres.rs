//! Postgres store.
//!
//! Multi-row writes run in one transaction. The payment success path locks the
//! order row and additionally guards its update with `paid = FALSE`, so a
//! replayed callback can never reach the stock decrement twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use tracing::{debug, info, warn};
use uuid::Uuid;
use super::{apply_cart_command, apply_step, CartChange, CartCommand, CheckoutContext, FulfillmentStep, PaymentAbandonment, PaymentConfirmation, ProductFilter, Store};
use crate::domain::aggregates::{Cart, CancelOutcome, CartItem, Category, Order, OrderItem, OrderStatus, PaymentOutcome, Product, ShippingInfo};
use crate::domain::value_objects::{Money, OrderId, ProductId, Stock, UserId};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, slug: String, category_id: Option<Uuid>, description: String, price: Decimal,
    stock: i64, available: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product::restore(
            r.id.into(), r.name, r.slug, r.category_id, r.description, Money::new(r.price),
            Stock::new(u64::try_from(r.stock).unwrap_or_default()), r.available, r.created_at, r.updated_at,
        )
    }
}

#[derive(sqlx::FromRow)]
struct CartLineRow { product_id: Uuid, name: String, price: Decimal, quantity: i64 }

#[derive(sqlx::FromRow)]
struct CartRow { updated_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: Uuid, first_name: String, last_name: String, email: String, address: String,
    postal_code: String, phone: String, city: String, note: String, paid: bool, transaction_id: Option<String>,
    status: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow { order_id: Uuid, product_id: Uuid, name: String, price: Decimal, quantity: i64 }

#[derive(sqlx::FromRow)]
struct CategoryRow { id: Uuid, name: String, slug: String, description: String }

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self { Category { id: r.id, name: r.name, slug: r.slug, description: r.description } }
}

#[derive(sqlx::FromRow)]
struct SessionRow { user_id: Uuid, order_id: Uuid, created_at: DateTime<Utc> }

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        let shipping = ShippingInfo {
            first_name: self.first_name, last_name: self.last_name, email: self.email, address: self.address,
            postal_code: self.postal_code, phone: self.phone, city: self.city, note: self.note,
        };
        let status: OrderStatus = self.status.parse()?;
        Ok(Order::restore(self.id.into(), self.user_id.into(), shipping, self.paid, self.transaction_id, status, items, self.created_at, self.updated_at))
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        OrderItem { product_id: r.product_id.into(), name: r.name, price: Money::new(r.price), quantity: u32::try_from(r.quantity).unwrap_or_default() }
    }
}

const ORDER_COLUMNS: &str = "id, user_id, first_name, last_name, email, address, postal_code, phone, city, note, paid, transaction_id, status, created_at, updated_at";

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }
}

async fn ensure_cart(conn: &mut PgConnection, user: UserId) -> Result<DateTime<Utc>> {
    sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user.as_uuid()).execute(&mut *conn).await?;
    let row = sqlx::query_as::<_, CartRow>("SELECT updated_at FROM carts WHERE user_id = $1 FOR UPDATE")
        .bind(user.as_uuid()).fetch_one(&mut *conn).await?;
    Ok(row.updated_at)
}

/// Loads the cart joined with live product rows. Product rows are share-locked
/// so stock and price cannot move before the surrounding transaction commits.
async fn load_cart(conn: &mut PgConnection, user: UserId) -> Result<Cart> {
    let updated_at = ensure_cart(conn, user).await?;
    let lines = sqlx::query_as::<_, CartLineRow>(
        "SELECT ci.product_id, p.name, p.price, ci.quantity FROM cart_items ci JOIN products p ON p.id = ci.product_id \
         WHERE ci.user_id = $1 ORDER BY ci.added_at FOR SHARE OF p",
    )
    .bind(user.as_uuid()).fetch_all(&mut *conn).await?;
    let items = lines.into_iter()
        .map(|l| CartItem { product_id: l.product_id.into(), name: l.name, unit_price: Money::new(l.price), quantity: u32::try_from(l.quantity).unwrap_or_default() })
        .collect();
    Ok(Cart::restore(user, items, updated_at))
}

async fn load_items(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<OrderItemRow>> {
    Ok(sqlx::query_as::<_, OrderItemRow>(
        "SELECT order_id, product_id, name, price, quantity FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
    )
    .bind(ids).fetch_all(&mut *conn).await?)
}

async fn load_order(conn: &mut PgConnection, id: OrderId, for_update: bool) -> Result<Option<Order>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{lock}");
    let Some(row) = sqlx::query_as::<_, OrderRow>(&sql).bind(id.as_uuid()).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };
    let items = load_items(conn, &[id.as_uuid()]).await?.into_iter().map(OrderItem::from).collect();
    row.into_order(items).map(Some)
}

async fn load_owned_order(conn: &mut PgConnection, user: UserId, id: OrderId) -> Result<Order> {
    let order = load_order(conn, id, true).await?.ok_or(EcommerceError::NotFound("Order"))?;
    if !order.is_owned_by(user) { return Err(EcommerceError::Unauthorized); }
    Ok(order)
}

async fn write_status(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(order.id().as_uuid()).bind(order.status().as_str()).bind(order.updated_at())
        .execute(&mut *conn).await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        Ok(row.map(Product::from))
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE available \
             AND ($1::uuid IS NULL OR category_id = $1) \
             AND ($2::numeric IS NULL OR price >= $2) \
             AND ($3::numeric IS NULL OR price <= $3) \
             ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5",
        )
        .bind(filter.category).bind(filter.min_price.map(|m| m.amount())).bind(filter.max_price.map(|m| m.amount()))
        .bind(i64::from(filter.limit())).bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn upsert_product(&self, p: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, name, slug, category_id, description, price, stock, available, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET name = $2, slug = $3, category_id = $4, description = $5, price = $6, \
             stock = $7, available = $8, updated_at = $10",
        )
        .bind(p.id().as_uuid()).bind(p.name()).bind(p.slug()).bind(p.category_id()).bind(p.description())
        .bind(p.price().amount()).bind(i64::try_from(p.stock().value()).unwrap_or(i64::MAX)).bind(p.is_available())
        .bind(p.created_at()).bind(p.updated_at())
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT id, name, slug, description FROM categories ORDER BY name")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn category(&self, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT id, name, slug, description FROM categories WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Category::from))
    }

    async fn upsert_category(&self, c: &Category) -> Result<()> {
        sqlx::query(
            "INSERT INTO categories (id, name, slug, description) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET name = $2, slug = $3, description = $4",
        )
        .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description)
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn cart(&self, user: UserId) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        let cart = load_cart(&mut tx, user).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn mutate_cart(&self, user: UserId, product_id: ProductId, command: CartCommand) -> Result<CartChange> {
        let mut tx = self.pool.begin().await?;
        let mut cart = load_cart(&mut tx, user).await?;
        let product = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 FOR SHARE")
            .bind(product_id.as_uuid()).fetch_optional(&mut *tx).await?.map(Product::from);
        let change = apply_cart_command(&mut cart, product.as_ref(), product_id, command)?;

        match cart.item(product_id) {
            Some(line) => {
                sqlx::query(
                    "INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3) \
                     ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = $3",
                )
                .bind(user.as_uuid()).bind(product_id.as_uuid()).bind(i64::from(line.quantity))
                .execute(&mut *tx).await?;
            }
            None => {
                sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
                    .bind(user.as_uuid()).bind(product_id.as_uuid()).execute(&mut *tx).await?;
            }
        }
        sqlx::query("UPDATE carts SET updated_at = $2 WHERE user_id = $1")
            .bind(user.as_uuid()).bind(cart.updated_at()).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(change)
    }

    async fn place_order(&self, user: UserId, shipping: ShippingInfo) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let cart = load_cart(&mut tx, user).await?;
        let order = Order::place(user, shipping, &cart)?;
        let s = order.shipping();
        sqlx::query(&format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"))
            .bind(order.id().as_uuid()).bind(user.as_uuid())
            .bind(&s.first_name).bind(&s.last_name).bind(&s.email).bind(&s.address)
            .bind(&s.postal_code).bind(&s.phone).bind(&s.city).bind(&s.note)
            .bind(order.is_paid()).bind(order.transaction_id()).bind(order.status().as_str())
            .bind(order.created_at()).bind(order.updated_at())
            .execute(&mut *tx).await?;
        for (position, item) in order.items().iter().enumerate() {
            sqlx::query("INSERT INTO order_items (order_id, position, product_id, name, price, quantity) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(order.id().as_uuid()).bind(i32::try_from(position).unwrap_or(i32::MAX)).bind(item.product_id.as_uuid())
                .bind(&item.name).bind(item.price.amount()).bind(i64::from(item.quantity))
                .execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user.as_uuid()).execute(&mut *tx).await?;
        let ctx = CheckoutContext::new(user, order.id());
        sqlx::query(
            "INSERT INTO checkout_sessions (user_id, order_id, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET order_id = $2, created_at = $3",
        )
        .bind(user.as_uuid()).bind(ctx.order_id.as_uuid()).bind(ctx.created_at)
        .execute(&mut *tx).await?;
        tx.commit().await?;
        debug!(order_id = %order.id(), items = order.items().len(), "order committed");
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        load_order(&mut conn, id, false).await
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"))
            .bind(user.as_uuid()).fetch_all(&mut *conn).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_items(&mut conn, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut items).into_iter().partition(|i| i.order_id == row.id);
                items = rest;
                row.into_order(mine.into_iter().map(OrderItem::from).collect())
            })
            .collect()
    }

    async fn confirm_payment(&self, user: UserId, id: OrderId) -> Result<PaymentConfirmation> {
        let mut tx = self.pool.begin().await?;
        let mut order = load_owned_order(&mut tx, user, id).await?;
        let outcome = order.confirm_payment()?;
        if outcome == PaymentOutcome::AlreadyPaid {
            return Ok(PaymentConfirmation { order, outcome });
        }
        let flipped = sqlx::query(
            "UPDATE orders SET paid = TRUE, status = $2, transaction_id = $3, updated_at = $4 WHERE id = $1 AND paid = FALSE",
        )
        .bind(id.as_uuid()).bind(order.status().as_str()).bind(order.transaction_id()).bind(order.updated_at())
        .execute(&mut *tx).await?
        .rows_affected();
        if flipped == 0 {
            warn!(order_id = %id, "order paid concurrently, skipping stock decrement");
            drop(tx);
            let order = self.order(id).await?.ok_or(EcommerceError::NotFound("Order"))?;
            return Ok(PaymentConfirmation { order, outcome: PaymentOutcome::AlreadyPaid });
        }
        for item in order.items() {
            sqlx::query("UPDATE products SET stock = GREATEST(stock - $2, 0), updated_at = NOW() WHERE id = $1")
                .bind(item.product_id.as_uuid()).bind(i64::from(item.quantity))
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(PaymentConfirmation { order, outcome })
    }

    async fn abandon_payment(&self, user: UserId, id: OrderId) -> Result<PaymentAbandonment> {
        let mut tx = self.pool.begin().await?;
        let mut order = load_owned_order(&mut tx, user, id).await?;
        let outcome = order.abandon_payment()?;
        if outcome == CancelOutcome::Canceled {
            write_status(&mut tx, &order).await?;
        }
        tx.commit().await?;
        Ok(PaymentAbandonment { order, outcome })
    }

    async fn advance_order(&self, id: OrderId, step: FulfillmentStep) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = load_order(&mut tx, id, true).await?.ok_or(EcommerceError::NotFound("Order"))?;
        apply_step(&mut order, step)?;
        write_status(&mut tx, &order).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn checkout_context(&self, user: UserId) -> Result<Option<CheckoutContext>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT user_id, order_id, created_at FROM checkout_sessions WHERE user_id = $1")
            .bind(user.as_uuid()).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| CheckoutContext { user_id: r.user_id.into(), order_id: r.order_id.into(), created_at: r.created_at }))
    }
}
