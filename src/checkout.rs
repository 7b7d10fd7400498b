//! Checkout orchestration: cart in, pending order out.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use crate::domain::aggregates::{Order, ShippingInfo};
use crate::domain::value_objects::UserId;
use crate::notify::{self, Notifier};
use crate::store::Store;
use crate::Result;

/// Converts the user's cart into a pending, unpaid order.
///
/// Order creation, the item snapshot, emptying the cart and recording the
/// order as the user's [`CheckoutContext`](crate::store::CheckoutContext)
/// commit together or not at all (`Store::place_order`). An empty cart fails
/// with `EmptyCart` and changes nothing.
#[instrument(skip_all, fields(user_id = %user))]
pub async fn checkout(store: &dyn Store, notifier: Arc<dyn Notifier>, user: UserId, shipping: ShippingInfo) -> Result<Order> {
    let order = store.place_order(user, shipping).await
        .inspect_err(|e| warn!(error = %e, "checkout rejected"))?;
    info!(order_id = %order.id(), total = %order.total(), items = order.items().len(), "order placed");
    notify::dispatch(notifier, order.clone(), false);
    Ok(order)
}
