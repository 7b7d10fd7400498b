//! Gateway callback handling.
//!
//! Each callback names an order and is re-checked against the signed-in user
//! before anything changes; knowing an order id is not enough.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use crate::domain::aggregates::{CancelOutcome, PaymentOutcome};
use crate::domain::value_objects::{OrderId, UserId};
use crate::notify::{self, Notifier};
use crate::store::{PaymentAbandonment, PaymentConfirmation, Store};
use crate::Result;

/// Payment succeeded: mark the order paid, move it to processing and take the
/// sold units out of stock. Safe to call repeatedly; only the first call
/// changes anything or notifies.
#[instrument(skip_all, fields(user_id = %user, order_id = %order_id))]
pub async fn payment_succeeded(store: &dyn Store, notifier: Arc<dyn Notifier>, user: UserId, order_id: OrderId) -> Result<PaymentConfirmation> {
    let confirmation = store.confirm_payment(user, order_id).await?;
    match confirmation.outcome {
        PaymentOutcome::Confirmed => {
            info!(total = %confirmation.order.total(), "payment confirmed");
            notify::dispatch(notifier, confirmation.order.clone(), true);
        }
        PaymentOutcome::AlreadyPaid => info!("repeated success callback ignored"),
    }
    Ok(confirmation)
}

/// Payment failed at the gateway.
#[instrument(skip_all, fields(user_id = %user, order_id = %order_id))]
pub async fn payment_failed(store: &dyn Store, notifier: Arc<dyn Notifier>, user: UserId, order_id: OrderId) -> Result<PaymentAbandonment> {
    abandon(store, notifier, user, order_id, "failed").await
}

/// Shopper backed out on the gateway's page. Handled exactly like a failure.
#[instrument(skip_all, fields(user_id = %user, order_id = %order_id))]
pub async fn payment_canceled(store: &dyn Store, notifier: Arc<dyn Notifier>, user: UserId, order_id: OrderId) -> Result<PaymentAbandonment> {
    abandon(store, notifier, user, order_id, "canceled").await
}

async fn abandon(store: &dyn Store, notifier: Arc<dyn Notifier>, user: UserId, order_id: OrderId, reason: &str) -> Result<PaymentAbandonment> {
    let abandonment = store.abandon_payment(user, order_id).await?;
    match abandonment.outcome {
        CancelOutcome::Canceled => {
            info!(reason, "order canceled");
            notify::dispatch(notifier, abandonment.order.clone(), false);
        }
        CancelOutcome::AlreadyCanceled => info!(reason, "order already canceled"),
        CancelOutcome::AlreadyPaid => warn!(reason, "payment callback for an already paid order ignored"),
    }
    Ok(abandonment)
}
