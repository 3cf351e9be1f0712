use serde::{Deserialize, Serialize};

use crate::db_types::Order;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    /// True if virtual stock was delivered automatically as part of the payment.
    pub auto_delivered: bool,
}

impl OrderPaidEvent {
    pub fn new(order: Order, auto_delivered: bool) -> Self {
        Self { order, auto_delivered }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShippedEvent {
    pub order: Order,
}

impl OrderShippedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderCancelledEvent {
    pub fn new(order: Order, reason: &str) -> Self {
        Self { order, reason: reason.to_string() }
    }
}
