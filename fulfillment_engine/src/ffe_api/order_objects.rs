use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        Attributes,
        DeliveryOrder,
        LineAllocation,
        Order,
        OrderLine,
        OrderNo,
        OrderStatusType,
        ProductType,
    },
    traits::OrderFlowError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub receiver_name: String,
    pub receiver_phone: Option<String>,
    pub receiver_address: String,
}

impl ShippingInfo {
    pub fn new(name: &str, address: &str) -> Self {
        Self { receiver_name: name.to_string(), receiver_phone: None, receiver_address: address.to_string() }
    }

    pub fn is_complete(&self) -> bool {
        !self.receiver_name.trim().is_empty() && !self.receiver_address.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub sku: String,
    pub quantity: i64,
    /// The attributes the customer picked. Blind-box attributes are ignored.
    #[serde(default)]
    pub attributes: Attributes,
}

impl NewOrderLine {
    pub fn new(sku: &str, quantity: i64, attributes: Attributes) -> Self {
        Self { sku: sku.to_string(), quantity, attributes }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub customer_id: String,
    pub lines: Vec<NewOrderLine>,
    pub receiver: Option<ShippingInfo>,
    pub promo_code: Option<String>,
    pub payment_method_id: Option<i64>,
    pub remark: Option<String>,
}

impl NewOrderRequest {
    pub fn new(customer_id: &str) -> Self {
        Self { customer_id: customer_id.to_string(), ..Default::default() }
    }

    pub fn with_line(mut self, line: NewOrderLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_receiver(mut self, receiver: ShippingInfo) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn with_promo_code(mut self, code: &str) -> Self {
        self.promo_code = Some(code.to_string());
        self
    }

    pub fn with_payment_method(mut self, id: i64) -> Self {
        self.payment_method_id = Some(id);
        self
    }
}

/// Where a line's stock will come from, as decided by the allocation engine before the order is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannedAllocation {
    Physical {
        pool_id: i64,
        /// The full attribute set of the chosen binding, including any randomly assigned keys.
        actual_attributes: Attributes,
    },
    Virtual {
        /// The attribute set used to look up the virtual pool(s).
        attributes: Attributes,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedLine {
    pub line_index: i64,
    pub catalog_item_id: i64,
    pub sku: String,
    pub name: String,
    pub product_type: ProductType,
    pub quantity: i64,
    /// The customer's own selection, which is all that the customer gets to see before paying.
    pub visible_attributes: Attributes,
    pub allocation: PlannedAllocation,
}

/// A fully resolved order, ready to be stored and reserved atomically by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlan {
    pub order_no: OrderNo,
    pub customer_id: String,
    pub receiver: Option<ShippingInfo>,
    pub promo_code: Option<String>,
    pub payment_method_id: Option<i64>,
    pub remark: Option<String>,
    pub delivery_order: DeliveryOrder,
    pub lines: Vec<PlannedLine>,
}

/// An order with its line items and allocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub allocations: Vec<LineAllocation>,
}

impl FullOrder {
    pub fn is_virtual_only(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|l| l.product_type == ProductType::Virtual)
    }

    pub fn has_physical_lines(&self) -> bool {
        self.lines.iter().any(|l| l.product_type == ProductType::Physical)
    }

    /// The view of the order that is safe to show the customer. Allocations (and with them, blind-box outcomes) are
    /// withheld until the order has been paid.
    pub fn customer_view(mut self) -> Self {
        if matches!(self.order.status, OrderStatusType::PendingPayment | OrderStatusType::Cancelled) {
            self.allocations.clear();
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub customer_id: Option<String>,
    pub status: Option<Vec<OrderStatusType>>,
    pub payment_method_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_payment_method(mut self, id: i64) -> Self {
        self.payment_method_id = Some(id);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.payment_method_id.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

/// Checks whether an order may move from `from` to `to`.
pub fn check_transition(from: OrderStatusType, to: OrderStatusType) -> Result<(), OrderFlowError> {
    use OrderStatusType::*;
    match (from, to) {
        (old, new) if old == new => Err(OrderFlowError::OrderModificationNoOp),
        // Payment
        (PendingPayment, Pending | Draft | Shipped) => Ok(()),
        // Shipping details supplied after payment
        (Draft, Pending) => Ok(()),
        // Tracking number or virtual delivery
        (Pending, Shipped) => Ok(()),
        (Shipped, Completed) => Ok(()),
        (Pending | Shipped, NeedResubmit) => Ok(()),
        (NeedResubmit, Pending) => Ok(()),
        (old, Cancelled) if old.is_pre_shipment() => Ok(()),
        (Pending | Shipped | Completed, Refunded) => Ok(()),
        (from, to) => Err(OrderFlowError::OrderModificationForbidden { from, to }),
    }
}
