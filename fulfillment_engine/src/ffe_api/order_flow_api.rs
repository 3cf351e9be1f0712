use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{Attributes, CatalogItem, Order, OrderNo, OrderSerial, OrderStatusType, PoolKind, ProductType},
    events::{EventProducers, OrderCancelledEvent, OrderPaidEvent, OrderShippedEvent},
    ffe_api::{
        allocation::{
            allocate,
            check_required_attributes,
            choose_policy,
            customer_selection,
            Allocation,
            AllocationPolicy,
        },
        order_objects::{
            check_transition,
            FullOrder,
            NewOrderLine,
            NewOrderRequest,
            OrderPlan,
            OrderQueryFilter,
            PlannedAllocation,
            PlannedLine,
            ShippingInfo,
        },
        settings::SettingsHandle,
    },
    helpers::new_order_no,
    traits::{
        InventoryManagement,
        OrderFlowError,
        OrderManagement,
        PaidTransition,
        PaymentRecord,
        PaymentVerifier,
        SweepResult,
        VerifierError,
    },
};

pub const AUTO_CANCEL_REMARK: &str = "Automatically cancelled: payment was not received in time";

/// `OrderFlowApi` is the primary API for moving orders through their lifecycle.
///
/// Order creation runs the allocation engine for every line and then hands the resulting plan to the backend, which
/// stores the order and makes every reservation in one transaction. Every later transition is likewise applied by the
/// backend in a single transaction, against a freshly locked copy of the order. Lifecycle events are published once
/// the transition has been committed.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    settings: SettingsHandle,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers, settings: SettingsHandle) -> Self {
        Self { db, producers, settings }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }
}

impl<B> OrderFlowApi<B>
where B: InventoryManagement + OrderManagement
{
    //------------------------------------------   Creation  ----------------------------------------------------------
    /// Creates a new order in `pending_payment`, with all of its stock reserved.
    ///
    /// Each line is validated and allocated in turn. If any line fails validation or allocation, nothing is stored.
    /// If the backend cannot make every reservation in the plan, it rolls the whole order back.
    pub async fn create_order(&self, request: NewOrderRequest) -> Result<FullOrder, OrderFlowError> {
        validate_request(&request)?;
        if let Some(id) = request.payment_method_id {
            match self.db.fetch_payment_method(id).await? {
                Some(m) if m.is_active => {},
                _ => return Err(OrderFlowError::PaymentMethodNotFound(id)),
            }
        }
        let delivery_order = self.settings.snapshot().await.virtual_delivery_order;
        let mut lines = Vec::with_capacity(request.lines.len());
        for (i, line) in request.lines.iter().enumerate() {
            let planned = self.plan_line(i as i64, line).await?;
            lines.push(planned);
        }
        let order_no = OrderNo::from(new_order_no(Utc::now()));
        let plan = OrderPlan {
            order_no,
            customer_id: request.customer_id.trim().to_string(),
            receiver: request.receiver,
            promo_code: request.promo_code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            payment_method_id: request.payment_method_id,
            remark: request.remark,
            delivery_order,
            lines,
        };
        let order = self.db.insert_order(plan).await?;
        info!(
            "🔄️ Order {} created for customer {} with {} lines",
            order.order.order_no,
            order.order.customer_id,
            order.lines.len()
        );
        Ok(order)
    }

    async fn plan_line(&self, line_index: i64, line: &NewOrderLine) -> Result<PlannedLine, OrderFlowError> {
        let sku = line.sku.trim();
        let item = self
            .db
            .fetch_catalog_item_by_sku(sku)
            .await?
            .ok_or_else(|| OrderFlowError::CatalogItemNotFound(sku.to_string()))?;
        if !item.is_active {
            return Err(OrderFlowError::CatalogItemInactive(sku.to_string()));
        }
        let selection = customer_selection(&item, &line.attributes);
        let policy = choose_policy(&item, &selection);
        trace!("🔄️ Line {line_index} ({sku} x{}) uses the {policy:?} policy", line.quantity);
        let allocation = match (item.product_type, policy) {
            (ProductType::Physical, policy) => {
                if policy == AllocationPolicy::Exact {
                    check_required_attributes(&item, &selection)?;
                }
                let chosen = self.allocate_line(&item, policy, &selection, line.quantity).await?;
                PlannedAllocation::Physical { pool_id: chosen.binding.pool_id, actual_attributes: chosen.attributes }
            },
            // Virtual items under an exact selection are drawn straight from the pools bound to that selection
            (ProductType::Virtual, AllocationPolicy::Exact) => {
                PlannedAllocation::Virtual { attributes: selection.clone() }
            },
            (ProductType::Virtual, policy) => {
                let chosen = self.allocate_line(&item, policy, &selection, line.quantity).await?;
                PlannedAllocation::Virtual { attributes: chosen.attributes }
            },
        };
        Ok(PlannedLine {
            line_index,
            catalog_item_id: item.id,
            sku: item.sku.clone(),
            name: item.name.clone(),
            product_type: item.product_type,
            quantity: line.quantity,
            visible_attributes: selection,
            allocation,
        })
    }

    async fn allocate_line(
        &self,
        item: &CatalogItem,
        policy: AllocationPolicy,
        selection: &Attributes,
        quantity: i64,
    ) -> Result<Allocation, OrderFlowError> {
        let kind: PoolKind = item.product_type.pool_kind();
        let candidates = self.db.fetch_binding_candidates(item.id, kind).await?;
        let chosen = allocate(policy, &candidates, selection, quantity, &mut rand::thread_rng())?;
        debug!("🎲️ {} allocated to {kind} pool {} under {}", item.sku, chosen.binding.pool_id, chosen.attributes);
        Ok(chosen)
    }

    //------------------------------------------   Queries  -----------------------------------------------------------
    pub async fn order(&self, order_no: &OrderNo) -> Result<FullOrder, OrderFlowError> {
        self.db.fetch_full_order(order_no).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_no.clone()))
    }

    /// The order as the customer may see it. Blind-box outcomes stay hidden until the order is paid.
    pub async fn customer_order(&self, order_no: &OrderNo) -> Result<FullOrder, OrderFlowError> {
        Ok(self.order(order_no).await?.customer_view())
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        self.db.search_orders(query).await
    }

    pub async fn serials(&self, order_no: &OrderNo) -> Result<Vec<OrderSerial>, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        self.db.fetch_serials(order.id).await
    }

    async fn order_header(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        self.db.fetch_order_by_order_no(order_no).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_no.clone()))
    }

    //------------------------------------------   Transitions  -------------------------------------------------------
    /// Marks the order as paid, and publishes [`OrderPaidEvent`] if the transition was applied.
    ///
    /// Calling this for an order that has already left `pending_payment` changes nothing and publishes nothing.
    pub async fn mark_as_paid(
        &self,
        order_no: &OrderNo,
        payment: PaymentRecord,
    ) -> Result<PaidTransition, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        let transition = self.db.mark_order_paid(order.id, payment).await?;
        if let PaidTransition::Applied { order, auto_delivered } = &transition {
            info!("🔄️ Order {} is paid. New status: {}", order.order_no, order.status);
            self.producers.publish_order_paid(OrderPaidEvent::new(order.clone(), *auto_delivered)).await;
        }
        Ok(transition)
    }

    pub async fn update_shipping_info(&self, order_no: &OrderNo, info: ShippingInfo) -> Result<Order, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        self.db.update_shipping_info(order.id, info).await
    }

    /// Ships a `pending` order, and publishes [`OrderShippedEvent`].
    pub async fn assign_tracking(
        &self,
        order_no: &OrderNo,
        tracking_no: &str,
        operator: &str,
    ) -> Result<Order, OrderFlowError> {
        if tracking_no.trim().is_empty() {
            return Err(OrderFlowError::ValidationError("Tracking number cannot be empty".to_string()));
        }
        let order = self.order_header(order_no).await?;
        let order = self.db.assign_tracking(order.id, tracking_no.trim(), operator).await?;
        self.producers.publish_order_shipped(OrderShippedEvent::new(order.clone())).await;
        Ok(order)
    }

    /// Delivers the order's reserved virtual stock by hand. If this ships the order, [`OrderShippedEvent`] is
    /// published.
    pub async fn deliver_virtual_stock(&self, order_no: &OrderNo, operator: &str) -> Result<Order, OrderFlowError> {
        let before = self.order_header(order_no).await?;
        let order = self.db.deliver_order_virtual_stock(before.id, operator).await?;
        if before.status != OrderStatusType::Shipped && order.status == OrderStatusType::Shipped {
            self.producers.publish_order_shipped(OrderShippedEvent::new(order.clone())).await;
        }
        Ok(order)
    }

    pub async fn complete_order(&self, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        self.db.complete_order(order.id).await
    }

    pub async fn request_resubmit(&self, order_no: &OrderNo, reason: &str) -> Result<Order, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        self.db.request_resubmit(order.id, reason).await
    }

    pub async fn resubmit(&self, order_no: &OrderNo, info: ShippingInfo) -> Result<Order, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        self.db.resubmit_order(order.id, info).await
    }

    /// Cancels a pre-shipment order, returning all of its stock, and publishes [`OrderCancelledEvent`].
    pub async fn cancel_order(&self, order_no: &OrderNo, reason: &str) -> Result<Order, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        self.cancel_by_id(order.id, reason).await
    }

    async fn cancel_by_id(&self, order_id: i64, reason: &str) -> Result<Order, OrderFlowError> {
        let order = self.db.cancel_order(order_id, reason).await?;
        self.producers.publish_order_cancelled(OrderCancelledEvent::new(order.clone(), reason)).await;
        Ok(order)
    }

    /// Refunds a paid order through its payment method, then marks it `refunded` and releases whatever it still holds.
    ///
    /// The status is checked before the verifier is called, and again by the backend when the refund is recorded.
    pub async fn refund_order<V: PaymentVerifier>(
        &self,
        order_no: &OrderNo,
        verifier: &V,
        remark: &str,
    ) -> Result<Order, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        check_transition(order.status, OrderStatusType::Refunded)?;
        let method_id = match order.payment_method_id {
            Some(id) => Some(id),
            None => self.db.fetch_order_payment(order.id).await?.and_then(|p| p.payment_method_id),
        };
        let method_id = method_id.ok_or_else(|| VerifierError::NotConfigured(format!("none for order {order_no}")))?;
        let method =
            self.db.fetch_payment_method(method_id).await?.ok_or(OrderFlowError::PaymentMethodNotFound(method_id))?;
        let timeout = self.settings.snapshot().await.check_timeout.to_std().unwrap_or_default();
        let result = tokio::time::timeout(timeout, verifier.refund(&order, &method))
            .await
            .map_err(|_| VerifierError::Timeout)??;
        if !result.success {
            let reason = result.message.unwrap_or_else(|| "No reason was given".to_string());
            warn!("🔄️ Refund for order {order_no} was declined. {reason}");
            return Err(OrderFlowError::RefundDeclined(reason));
        }
        let order = self.db.mark_order_refunded(order.id, remark).await?;
        info!("🔄️ Order {order_no} refunded through payment method {}", method.name);
        Ok(order)
    }

    pub async fn delete_order(&self, order_no: &OrderNo) -> Result<(), OrderFlowError> {
        let order = self.order_header(order_no).await?;
        self.db.delete_order(order.id).await
    }

    pub async fn issue_serials(&self, order_no: &OrderNo) -> Result<Vec<OrderSerial>, OrderFlowError> {
        let order = self.order_header(order_no).await?;
        self.db.issue_serials(order.id).await
    }

    //------------------------------------------   Auto-cancel  -------------------------------------------------------
    /// Cancels every `pending_payment` order older than the configured TTL.
    ///
    /// Does nothing if the TTL is zero or negative. Orders that were paid in the meantime are skipped quietly, and
    /// any other failure is reported in the result and retried on the next sweep.
    pub async fn cancel_expired_orders(&self) -> Result<SweepResult, OrderFlowError> {
        let settings = self.settings.snapshot().await;
        let mut result = SweepResult::default();
        if !settings.auto_cancel_enabled() {
            trace!("🕰️ Auto-cancel is disabled");
            return Ok(result);
        }
        let cutoff = Utc::now() - settings.auto_cancel_ttl;
        let expired = self.db.fetch_expired_orders(cutoff).await?;
        if expired.is_empty() {
            return Ok(result);
        }
        debug!("🕰️ {} unpaid orders were created before {cutoff}", expired.len());
        for order in expired {
            match self.cancel_by_id(order.id, AUTO_CANCEL_REMARK).await {
                Ok(cancelled) => result.cancelled.push(cancelled),
                Err(OrderFlowError::OrderModificationForbidden { from, .. }) => {
                    debug!("🕰️ Order {} moved to {from} before it could be cancelled. Skipping", order.order_no);
                },
                Err(e) => {
                    warn!("🕰️ Could not cancel expired order {}. {e}", order.order_no);
                    result.failed.push((order.id, e.to_string()));
                },
            }
        }
        Ok(result)
    }
}

fn validate_request(request: &NewOrderRequest) -> Result<(), OrderFlowError> {
    if request.customer_id.trim().is_empty() {
        return Err(OrderFlowError::ValidationError("Customer id cannot be empty".to_string()));
    }
    if request.lines.is_empty() {
        return Err(OrderFlowError::ValidationError("An order needs at least one item".to_string()));
    }
    for line in &request.lines {
        if line.sku.trim().is_empty() {
            return Err(OrderFlowError::ValidationError("Product SKU cannot be empty".to_string()));
        }
        if line.quantity <= 0 {
            return Err(OrderFlowError::ValidationError("Quantity must be greater than 0".to_string()));
        }
    }
    Ok(())
}
