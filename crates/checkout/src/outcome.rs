//! Successful checkout results.

use common::OrderId;
use storage::Order;

/// How a checkout that did not fail ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    /// A new order was committed together with its stock decrement.
    Created(Order),
    /// The token had already produced this order. Nothing was mutated.
    Duplicate(Order),
}

impl CheckoutOutcome {
    pub fn order(&self) -> &Order {
        match self {
            Self::Created(order) | Self::Duplicate(order) => order,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order().id
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Duplicate(_) => "duplicate",
        }
    }
}
