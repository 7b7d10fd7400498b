//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self { Self(Uuid::now_v7()) }
            pub fn from_uuid(id: Uuid) -> Self { Self(id) }
            pub fn as_uuid(&self) -> Uuid { self.0 }
        }

        impl Default for $name { fn default() -> Self { Self::new() } }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl From<Uuid> for $name { fn from(id: Uuid) -> Self { Self(id) } }
    };
}

id_type!(
    /// Authenticated shopper, as supplied by the auth collaborator.
    UserId
);
id_type!(ProductId);
id_type!(
    /// Order identifier. Doubles as the gateway's `tran_id` correlation key.
    OrderId
);

/// Money value object.
///
/// Always fixed-point; the shop trades in a single configured currency, so the
/// currency code lives in configuration rather than on every amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    /// Two-decimal string as the gateway expects it, e.g. `"40.00"`.
    pub fn to_gateway_string(&self) -> String { format!("{:.2}", self.0.round_dp(2)) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl Default for Money { fn default() -> Self { Self::ZERO } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<Decimal> for Money { fn from(d: Decimal) -> Self { Self(d) } }

/// Units of a product on hand. Never negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stock(u64);

impl Stock {
    pub fn new(value: u64) -> Self { Self(value) }
    pub fn value(&self) -> u64 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
    pub fn covers(&self, qty: u64) -> bool { qty <= self.0 }
    pub fn add(&self, qty: u64) -> Self { Self(self.0.saturating_add(qty)) }

    /// Removes `qty` units, stopping at zero instead of going negative.
    pub fn decrement_floored(&self, qty: u64) -> Self { Self(self.0.saturating_sub(qty)) }
}

impl fmt::Display for Stock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
