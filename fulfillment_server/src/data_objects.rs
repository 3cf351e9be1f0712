use std::fmt::Display;

use chrono::{DateTime, Utc};
use fulfillment_engine::{
    db_types::{Attributes, Order, OrderStatusType, VirtualStockStatus},
    order_objects::OrderQueryFilter,
    traits::{PaidTransition, PaymentRecord, PoolQueryFilter},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// An operator confirming a payment that arrived outside the payment poller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualPaymentParams {
    pub payment_method_id: Option<i64>,
    pub transaction_id: Option<String>,
    pub data: Option<String>,
}

impl From<ManualPaymentParams> for PaymentRecord {
    fn from(params: ManualPaymentParams) -> Self {
        match params.payment_method_id {
            Some(id) => PaymentRecord::new(id, params.transaction_id, params.data),
            None => {
                PaymentRecord { transaction_id: params.transaction_id, data: params.data, ..PaymentRecord::manual() }
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub order: Order,
    /// False if the order had already been processed, in which case nothing changed.
    pub applied: bool,
    pub auto_delivered: bool,
}

impl From<PaidTransition> for PaymentResponse {
    fn from(transition: PaidTransition) -> Self {
        match transition {
            PaidTransition::Applied { order, auto_delivered } => Self { order, applied: true, auto_delivered },
            PaidTransition::AlreadyProcessed(order) => Self { order, applied: false, auto_delivered: false },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipOrderParams {
    pub tracking_no: String,
    pub operator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorParams {
    pub operator: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonParams {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSearchParams {
    pub customer_id: Option<String>,
    pub status: Option<OrderStatusType>,
    pub payment_method_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl From<OrderSearchParams> for OrderQueryFilter {
    fn from(params: OrderSearchParams) -> Self {
        OrderQueryFilter {
            customer_id: params.customer_id,
            status: params.status.map(|s| vec![s]),
            payment_method_id: params.payment_method_id,
            since: params.since,
            until: params.until,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSearchParams {
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub low_stock_only: bool,
    pub sku: Option<String>,
}

impl From<PoolSearchParams> for PoolQueryFilter {
    fn from(params: PoolSearchParams) -> Self {
        PoolQueryFilter { active_only: params.active_only, low_stock_only: params.low_stock_only, sku: params.sku }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveParams {
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustParams {
    #[serde(default)]
    pub stock_delta: i64,
    #[serde(default)]
    pub available_delta: i64,
    pub operator: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBindingParams {
    pub is_random: bool,
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVirtualPoolParams {
    pub name: String,
    pub description: Option<String>,
}

/// One item per line, as `content` or `content,remark`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportParams {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub pool_id: i64,
    pub imported: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualItemsParams {
    pub status: Option<VirtualStockStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromoCodeParams {
    pub code: String,
    pub total: i64,
}

/// Asks how many units of a product can still be sold. Without attributes, the answer covers every configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub sku: String,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub sku: String,
    pub attributes: Attributes,
    pub available: i64,
}
