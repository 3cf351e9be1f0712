use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        NewPaymentMethod,
        Order,
        OrderNo,
        OrderPayment,
        OrderSerial,
        OrderStatusType,
        PaymentMethod,
        PromoCode,
    },
    order_objects::{FullOrder, OrderPlan, OrderQueryFilter, ShippingInfo},
    traits::{
        data_objects::{PaidTransition, PaymentRecord},
        AllocationError,
        InventoryError,
        VerifierError,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderNo),
    #[error("Product {0} does not exist")]
    CatalogItemNotFound(String),
    #[error("Product {0} is not available for sale")]
    CatalogItemInactive(String),
    #[error("{0}")]
    Allocation(#[from] AllocationError),
    #[error("{0}")]
    Inventory(#[from] InventoryError),
    #[error("Promo code {0} does not exist or is not active")]
    PromoCodeNotFound(String),
    #[error("Promo code {0} has been fully used")]
    PromoCodeExhausted(String),
    #[error("Payment method {0} does not exist or is not active")]
    PaymentMethodNotFound(i64),
    #[error("The requested order change would result in a no-op.")]
    OrderModificationNoOp,
    #[error("Order status cannot change from {from} to {to}.")]
    OrderModificationForbidden { from: OrderStatusType, to: OrderStatusType },
    #[error("Order {0} has no virtual stock waiting to be delivered")]
    NothingToDeliver(OrderNo),
    #[error("Order {0} cannot be deleted in its current state")]
    CannotDelete(OrderNo),
    #[error("The refund was declined. {0}")]
    RefundDeclined(String),
    #[error("{0}")]
    Verifier(#[from] VerifierError),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}

/// Owns the order aggregate.
///
/// Every method that moves stock does so in the same backend transaction as the status change, so either both happen
/// or neither does. Status transitions are re-checked inside that transaction, against the freshly locked order.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    //------------------------------------------   Reference data  ----------------------------------------------------
    async fn create_payment_method(&self, method: NewPaymentMethod) -> Result<PaymentMethod, OrderFlowError>;

    async fn fetch_payment_method(&self, id: i64) -> Result<Option<PaymentMethod>, OrderFlowError>;

    async fn create_promo_code(&self, code: &str, total: i64) -> Result<PromoCode, OrderFlowError>;

    async fn fetch_promo_code(&self, code: &str) -> Result<Option<PromoCode>, OrderFlowError>;

    //------------------------------------------   Queries  -----------------------------------------------------------
    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderFlowError>;

    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderFlowError>;

    async fn fetch_full_order(&self, order_no: &OrderNo) -> Result<Option<FullOrder>, OrderFlowError>;

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    async fn fetch_order_payment(&self, order_id: i64) -> Result<Option<OrderPayment>, OrderFlowError>;

    async fn fetch_serials(&self, order_id: i64) -> Result<Vec<OrderSerial>, OrderFlowError>;

    /// Orders in `pending_payment` created before `cutoff`.
    async fn fetch_expired_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderFlowError>;

    /// Orders in `pending_payment` that have a payment method selected.
    async fn fetch_pollable_orders(&self) -> Result<Vec<Order>, OrderFlowError>;

    //------------------------------------------   Transitions  -------------------------------------------------------
    /// Stores the order and makes every reservation in the plan, in one transaction.
    ///
    /// Physical lines are reserved against their planned pool, virtual lines draw items from the pools bound to the
    /// line's attributes, and the promo code (if any) is put on hold. If any step fails, nothing is kept.
    async fn insert_order(&self, plan: OrderPlan) -> Result<FullOrder, OrderFlowError>;

    /// Applies the paid transition and records the payment, atomically.
    ///
    /// Orders that are no longer `pending_payment` are returned as [`PaidTransition::AlreadyProcessed`] untouched, so
    /// calling this twice for the same order is safe.
    async fn mark_order_paid(&self, order_id: i64, payment: PaymentRecord) -> Result<PaidTransition, OrderFlowError>;

    /// Stores the receiver details. A `draft` order moves to `pending`.
    async fn update_shipping_info(&self, order_id: i64, info: ShippingInfo) -> Result<Order, OrderFlowError>;

    /// `pending` → `shipped`. Physical reservations are deducted and remaining virtual stock is delivered.
    async fn assign_tracking(&self, order_id: i64, tracking_no: &str, operator: &str) -> Result<Order, OrderFlowError>;

    /// Delivers the order's reserved virtual stock. A purely virtual `pending` order becomes `shipped`.
    async fn deliver_order_virtual_stock(&self, order_id: i64, operator: &str) -> Result<Order, OrderFlowError>;

    /// `shipped` → `completed`. Any promo code hold is converted into a use.
    async fn complete_order(&self, order_id: i64) -> Result<Order, OrderFlowError>;

    /// `pending`/`shipped` → `need_resubmit`.
    async fn request_resubmit(&self, order_id: i64, reason: &str) -> Result<Order, OrderFlowError>;

    /// `need_resubmit` → `pending`, with updated receiver details.
    async fn resubmit_order(&self, order_id: i64, info: ShippingInfo) -> Result<Order, OrderFlowError>;

    /// Cancels a pre-shipment order, releasing every reservation, the promo code hold and any issued serials. The
    /// order's polling task record is removed in the same transaction.
    async fn cancel_order(&self, order_id: i64, remark: &str) -> Result<Order, OrderFlowError>;

    /// Marks a paid order as refunded and releases whatever is still reserved.
    async fn mark_order_refunded(&self, order_id: i64, remark: &str) -> Result<Order, OrderFlowError>;

    /// Deletes an order in `pending_payment`, `draft` or `cancelled`. Reservations are released if still held.
    async fn delete_order(&self, order_id: i64) -> Result<(), OrderFlowError>;

    /// Issues one serial per physical unit in the order. Idempotent: existing serials are returned as they are.
    async fn issue_serials(&self, order_id: i64) -> Result<Vec<OrderSerial>, OrderFlowError>;
}
