//! Notification collaborator.
//!
//! Order confirmations and order events leave the service through a
//! [`Notifier`]. Sends are fire-and-forget: callers spawn them and only log
//! failures.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use crate::domain::aggregates::Order;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, OrderId};

pub const CONFIRMATION_SUBJECT: &str = "shop.notifications.order_confirmation";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("NATS publish error: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Payload of an order confirmation message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub subject: String,
    pub to: String,
    pub customer_name: String,
    pub total: Money,
    pub items: Vec<ConfirmationLine>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfirmationLine { pub name: String, pub quantity: u32, pub price: Money }

impl OrderConfirmation {
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            subject: format!("ShopNest Order Confirmation - Order #{}", order.id()),
            to: order.shipping().email.clone(),
            customer_name: order.shipping().full_name(),
            total: order.total(),
            items: order.items().iter().map(|i| ConfirmationLine { name: i.name.clone(), quantity: i.quantity, price: i.price }).collect(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError>;
    async fn publish(&self, event: &OrderEvent) -> Result<(), NotifyError>;
}

/// Publishes confirmations and events on NATS.
pub struct NatsNotifier { client: async_nats::Client }

impl NatsNotifier {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(&OrderConfirmation::for_order(order))?;
        self.client.publish(CONFIRMATION_SUBJECT.to_string(), payload.into()).await
            .map_err(|e| NotifyError::Publish(e.to_string()))
    }

    async fn publish(&self, event: &OrderEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(event)?;
        self.client.publish(event.subject().to_string(), payload.into()).await
            .map_err(|e| NotifyError::Publish(e.to_string()))
    }
}

/// Used when no broker is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<(), NotifyError> {
        let c = OrderConfirmation::for_order(order);
        info!(order_id = %c.order_id, to = %c.to, total = %c.total, "order confirmation");
        Ok(())
    }

    async fn publish(&self, event: &OrderEvent) -> Result<(), NotifyError> {
        info!(order_id = %event.order_id(), subject = event.subject(), "order event");
        Ok(())
    }
}

/// Spawns the confirmation plus any pending events for `order`.
pub fn dispatch(notifier: Arc<dyn Notifier>, mut order: Order, confirm: bool) -> tokio::task::JoinHandle<()> {
    let events = order.take_events();
    tokio::spawn(async move {
        for event in &events {
            if let Err(e) = notifier.publish(event).await {
                error!(order_id = %order.id(), error = %e, "order event not published");
            }
        }
        if confirm {
            if let Err(e) = notifier.send_order_confirmation(&order).await {
                error!(order_id = %order.id(), error = %e, "order confirmation not sent");
            }
        }
    })
}
