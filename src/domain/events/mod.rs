//! Domain events
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{Money, OrderId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, user_id: UserId, total: Money },
    PaymentConfirmed { order_id: OrderId, user_id: UserId, transaction_id: String, total: Money, email: String },
    Canceled { order_id: OrderId },
    Shipped { order_id: OrderId },
    Delivered { order_id: OrderId },
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::Placed { order_id, .. }
            | Self::PaymentConfirmed { order_id, .. }
            | Self::Canceled { order_id }
            | Self::Shipped { order_id }
            | Self::Delivered { order_id } => *order_id,
        }
    }

    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "shop.orders.placed",
            Self::PaymentConfirmed { .. } => "shop.orders.payment_confirmed",
            Self::Canceled { .. } => "shop.orders.canceled",
            Self::Shipped { .. } => "shop.orders.shipped",
            Self::Delivered { .. } => "shop.orders.delivered",
        }
    }
}
