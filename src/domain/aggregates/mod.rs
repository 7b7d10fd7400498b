//! Aggregates module
pub mod category;
pub mod product;
pub mod order;
pub mod cart;

pub use category::Category;
pub use product::Product;
pub use order::{CancelOutcome, Order, OrderError, OrderItem, OrderStatus, PaymentOutcome, ShippingInfo};
pub use cart::{Cart, CartError, CartItem, QuantityChange};
