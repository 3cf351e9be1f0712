//! `SqliteDatabase` is the bundled fulfillment engine backend.
//!
//! It implements [`InventoryManagement`], [`OrderManagement`] and [`PollingTaskStore`] on top of the low-level
//! functions in [`super::db`]. Any method that changes more than one row does so inside a single transaction.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

use super::db::{
    bindings,
    catalog,
    db_url,
    new_pool,
    orders,
    payments,
    pools,
    promo_codes,
    serials,
    virtual_stock,
};
use crate::{
    db_types::{
        Attributes,
        Binding,
        CatalogItem,
        DeliveryOrder,
        InventoryLog,
        LineAllocation,
        NewBinding,
        NewCatalogItem,
        NewPaymentMethod,
        NewStockPool,
        NewVirtualItem,
        Order,
        OrderNo,
        OrderPayment,
        OrderSerial,
        OrderStatusType,
        PaymentMethod,
        PollingTask,
        PoolKind,
        ProductType,
        PromoCode,
        StockPool,
        VirtualPool,
        VirtualPoolStats,
        VirtualStockItem,
        VirtualStockStatus,
    },
    order_objects::{check_transition, FullOrder, OrderPlan, OrderQueryFilter, PlannedAllocation, ShippingInfo},
    traits::{
        AdjustOutcome,
        AdjustRequest,
        BindingCandidate,
        InventoryError,
        InventoryManagement,
        LedgerOutcome,
        OrderFlowError,
        OrderManagement,
        PaidTransition,
        PaymentRecord,
        PollingError,
        PollingTaskStore,
        PoolQueryFilter,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `FFE_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Connects to the database at `url`, creating it first if needed, and applies any outstanding migrations.
    pub async fn connect_and_migrate(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        if !Sqlite::database_exists(url).await? {
            info!("🗃️ Creating database at {url}");
            Sqlite::create_database(url).await?;
        }
        let db = Self::new_with_url(url, max_connections).await?;
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&db.pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
        debug!("🗃️ Database migrations are up to date");
        Ok(db)
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) {
        self.pool.close().await;
    }
}

impl InventoryManagement for SqliteDatabase {
    async fn create_catalog_item(&self, item: NewCatalogItem) -> Result<CatalogItem, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let item = catalog::insert_catalog_item(item, &mut tx).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn fetch_catalog_item(&self, id: i64) -> Result<Option<CatalogItem>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_catalog_item(id, &mut conn).await?)
    }

    async fn fetch_catalog_item_by_sku(&self, sku: &str) -> Result<Option<CatalogItem>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_catalog_item_by_sku(sku, &mut conn).await?)
    }

    async fn set_catalog_item_active(&self, id: i64, active: bool) -> Result<CatalogItem, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let item = catalog::set_active(id, active, &mut tx)
            .await?
            .ok_or_else(|| InventoryError::CatalogItemNotFound(id.to_string()))?;
        tx.commit().await?;
        Ok(item)
    }

    async fn create_binding(&self, binding: NewBinding) -> Result<Binding, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let item_id = binding.catalog_item_id;
        if catalog::fetch_catalog_item(item_id, &mut tx).await?.is_none() {
            return Err(InventoryError::CatalogItemNotFound(item_id.to_string()));
        }
        match binding.pool_kind {
            PoolKind::Physical => {
                pools::fetch_pool(binding.pool_id, &mut tx)
                    .await?
                    .ok_or(InventoryError::PoolNotFound(binding.pool_id))?;
            },
            PoolKind::Virtual => {
                virtual_stock::fetch_pool(binding.pool_id, &mut tx)
                    .await?
                    .ok_or(InventoryError::VirtualPoolNotFound(binding.pool_id))?;
            },
        }
        let binding = bindings::insert_binding(binding, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "📦️ Catalog item {item_id} bound to {} pool {} under {}",
            binding.pool_kind, binding.pool_id, binding.attributes
        );
        Ok(binding)
    }

    async fn fetch_bindings(&self, catalog_item_id: i64) -> Result<Vec<Binding>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(bindings::fetch_bindings_for_item(catalog_item_id, &mut conn).await?)
    }

    async fn update_binding(&self, id: i64, is_random: bool, priority: i64) -> Result<Binding, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let binding = bindings::update_binding(id, is_random, priority, &mut tx)
            .await?
            .ok_or(InventoryError::BindingNotFound(id))?;
        tx.commit().await?;
        Ok(binding)
    }

    async fn delete_binding(&self, id: i64) -> Result<(), InventoryError> {
        let mut tx = self.pool.begin().await?;
        if bindings::delete_binding(id, &mut tx).await? {
            tx.commit().await?;
            Ok(())
        } else {
            Err(InventoryError::BindingNotFound(id))
        }
    }

    async fn fetch_binding_candidates(
        &self,
        catalog_item_id: i64,
        kind: PoolKind,
    ) -> Result<Vec<BindingCandidate>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(bindings::fetch_candidates(catalog_item_id, kind, &mut conn).await?)
    }

    async fn create_stock_pool(&self, pool: NewStockPool) -> Result<StockPool, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let pool = pools::insert_pool(pool, &mut tx).await?;
        tx.commit().await?;
        Ok(pool)
    }

    async fn fetch_stock_pool(&self, id: i64) -> Result<Option<StockPool>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(pools::fetch_pool(id, &mut conn).await?)
    }

    async fn search_stock_pools(&self, filter: PoolQueryFilter) -> Result<Vec<StockPool>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(pools::search_pools(filter, &mut conn).await?)
    }

    async fn set_stock_pool_active(&self, id: i64, active: bool) -> Result<StockPool, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let pool = pools::set_active(id, active, &mut tx).await?.ok_or(InventoryError::PoolNotFound(id))?;
        tx.commit().await?;
        Ok(pool)
    }

    async fn delete_stock_pool(&self, id: i64) -> Result<(), InventoryError> {
        let mut tx = self.pool.begin().await?;
        pools::delete_pool(id, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_inventory_logs(&self, pool_id: i64) -> Result<Vec<InventoryLog>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(pools::fetch_logs(pool_id, &mut conn).await?)
    }

    async fn reserve(
        &self,
        pool_id: i64,
        quantity: i64,
        correlation_id: &str,
    ) -> Result<LedgerOutcome, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let outcome = pools::reserve(pool_id, quantity, correlation_id, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn deduct(&self, pool_id: i64, quantity: i64, correlation_id: &str) -> Result<LedgerOutcome, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let outcome = pools::deduct(pool_id, quantity, correlation_id, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn release_reserve(
        &self,
        pool_id: i64,
        quantity: i64,
        correlation_id: &str,
    ) -> Result<LedgerOutcome, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let outcome = pools::release(pool_id, quantity, correlation_id, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn adjust_by_delta(&self, request: AdjustRequest) -> Result<AdjustOutcome, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let outcome = pools::adjust(request, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn create_virtual_pool(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<VirtualPool, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let pool = virtual_stock::insert_pool(name, description, &mut tx).await?;
        tx.commit().await?;
        Ok(pool)
    }

    async fn fetch_virtual_pool(&self, id: i64) -> Result<Option<VirtualPool>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(virtual_stock::fetch_pool(id, &mut conn).await?)
    }

    async fn fetch_virtual_pools(&self) -> Result<Vec<VirtualPool>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(virtual_stock::fetch_pools(&mut conn).await?)
    }

    async fn import_virtual_items(
        &self,
        pool_id: i64,
        items: Vec<NewVirtualItem>,
        batch_no: &str,
    ) -> Result<u64, InventoryError> {
        let mut tx = self.pool.begin().await?;
        virtual_stock::fetch_pool(pool_id, &mut tx).await?.ok_or(InventoryError::VirtualPoolNotFound(pool_id))?;
        let count = virtual_stock::import_items(pool_id, items, batch_no, &mut tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn fetch_virtual_items(
        &self,
        pool_id: i64,
        status: Option<VirtualStockStatus>,
    ) -> Result<Vec<VirtualStockItem>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(virtual_stock::fetch_items(pool_id, status, &mut conn).await?)
    }

    async fn fetch_virtual_items_for_order(&self, order_no: &OrderNo) -> Result<Vec<VirtualStockItem>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(virtual_stock::fetch_items_for_order(order_no, &mut conn).await?)
    }

    async fn virtual_pool_stats(&self, pool_id: i64) -> Result<VirtualPoolStats, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(virtual_stock::pool_stats(pool_id, &mut conn).await?)
    }

    async fn invalidate_virtual_item(&self, item_id: i64) -> Result<VirtualStockItem, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let item = virtual_stock::invalidate_item(item_id, &mut tx).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn allocate_virtual_stock(
        &self,
        catalog_item_id: i64,
        attributes: &Attributes,
        quantity: i64,
        order_no: &OrderNo,
        delivery_order: DeliveryOrder,
    ) -> Result<Vec<VirtualStockItem>, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let items =
            virtual_stock::allocate(catalog_item_id, attributes, quantity, order_no, delivery_order, &mut tx).await?;
        tx.commit().await?;
        Ok(items)
    }

    async fn deliver_virtual_stock(&self, order_no: &OrderNo, operator: &str) -> Result<u64, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let delivered = virtual_stock::deliver(order_no, operator, &mut tx).await?;
        tx.commit().await?;
        Ok(delivered)
    }

    async fn deliver_auto_delivery_stock(&self, order_no: &OrderNo) -> Result<u64, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let delivered = virtual_stock::deliver_auto(order_no, &mut tx).await?;
        tx.commit().await?;
        Ok(delivered)
    }

    async fn release_virtual_stock(&self, order_no: &OrderNo) -> Result<u64, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let released = virtual_stock::release(order_no, &mut tx).await?;
        tx.commit().await?;
        Ok(released)
    }

    async fn can_auto_deliver(&self, order_no: &OrderNo) -> Result<bool, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(virtual_stock::can_auto_deliver(order_no, &mut conn).await?)
    }

    async fn has_pending_virtual_stock(&self, order_no: &OrderNo) -> Result<bool, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(virtual_stock::count_reserved(order_no, &mut conn).await? > 0)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn create_payment_method(&self, method: NewPaymentMethod) -> Result<PaymentMethod, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let method = payments::insert_payment_method(method, &mut tx).await?;
        tx.commit().await?;
        Ok(method)
    }

    async fn fetch_payment_method(&self, id: i64) -> Result<Option<PaymentMethod>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment_method(id, &mut conn).await?)
    }

    async fn create_promo_code(&self, code: &str, total: i64) -> Result<PromoCode, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let promo_code = promo_codes::insert_promo_code(code, total, &mut tx).await?;
        tx.commit().await?;
        Ok(promo_code)
    }

    async fn fetch_promo_code(&self, code: &str) -> Result<Option<PromoCode>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(promo_codes::fetch_promo_code(code, &mut conn).await?)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(id, &mut conn).await?)
    }

    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_no(order_no, &mut conn).await?)
    }

    async fn fetch_full_order(&self, order_no: &OrderNo) -> Result<Option<FullOrder>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let Some(order) = orders::fetch_order_by_order_no(order_no, &mut conn).await? else {
            return Ok(None);
        };
        let lines = orders::fetch_lines(order.id, &mut conn).await?;
        let allocations = orders::fetch_allocations(order.id, &mut conn).await?;
        Ok(Some(FullOrder { order, lines, allocations }))
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::search_orders(query, &mut conn).await?)
    }

    async fn fetch_order_payment(&self, order_id: i64) -> Result<Option<OrderPayment>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_order_payment(order_id, &mut conn).await?)
    }

    async fn fetch_serials(&self, order_id: i64) -> Result<Vec<OrderSerial>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(serials::fetch_serials(order_id, &mut conn).await?)
    }

    async fn fetch_expired_orders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_expired_orders(cutoff, &mut conn).await?)
    }

    async fn fetch_pollable_orders(&self) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_pollable_orders(&mut conn).await?)
    }

    /// Stores the order and makes every reservation in the plan in a single transaction.
    ///
    /// The order header is written first, which takes the database write lock. Each line then reserves its stock
    /// against freshly read counts. Any error drops the transaction, which undoes every reservation made so far.
    async fn insert_order(&self, plan: OrderPlan) -> Result<FullOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let mut order = orders::insert_order(&plan, None, Utc::now(), &mut tx).await?;
        if let Some(code) = plan.promo_code.as_deref() {
            let promo = promo_codes::reserve(code, &mut tx).await?;
            orders::set_promo_code(order.id, promo.id, &mut tx).await?;
            order.promo_code_id = Some(promo.id);
        }
        let mut lines = Vec::with_capacity(plan.lines.len());
        let mut allocations = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let stored = orders::insert_line(order.id, line, &mut tx).await?;
            let allocation = match &line.allocation {
                PlannedAllocation::Physical { pool_id, actual_attributes } => {
                    let token = plan.order_no.line_token(line.line_index);
                    pools::reserve(*pool_id, line.quantity, &token, &mut tx).await?;
                    LineAllocation {
                        id: 0,
                        order_id: order.id,
                        line_index: line.line_index,
                        pool_kind: PoolKind::Physical,
                        pool_id: Some(*pool_id),
                        quantity: line.quantity,
                        actual_attributes: actual_attributes.clone(),
                    }
                },
                PlannedAllocation::Virtual { attributes } => {
                    let items = virtual_stock::allocate(
                        line.catalog_item_id,
                        attributes,
                        line.quantity,
                        &plan.order_no,
                        plan.delivery_order,
                        &mut tx,
                    )
                    .await?;
                    let first = items.first().map(|i| i.pool_id);
                    let single_pool = first.filter(|p| items.iter().all(|i| i.pool_id == *p));
                    LineAllocation {
                        id: 0,
                        order_id: order.id,
                        line_index: line.line_index,
                        pool_kind: PoolKind::Virtual,
                        pool_id: single_pool,
                        quantity: line.quantity,
                        actual_attributes: attributes.clone(),
                    }
                },
            };
            allocations.push(orders::insert_allocation(&allocation, &mut tx).await?);
            lines.push(stored);
        }
        tx.commit().await?;
        debug!("🗃️ Order {} saved with {} lines, all stock reserved", order.order_no, lines.len());
        Ok(FullOrder { order, lines, allocations })
    }

    async fn mark_order_paid(&self, order_id: i64, payment: PaymentRecord) -> Result<PaidTransition, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        if order.status != OrderStatusType::PendingPayment {
            debug!("🗃️ Order {} is already {}. The payment is not applied again", order.order_no, order.status);
            return Ok(PaidTransition::AlreadyProcessed(order));
        }
        let lines = orders::fetch_lines(order.id, &mut tx).await?;
        let is_virtual = |t: ProductType| t == ProductType::Virtual;
        let has_virtual = lines.iter().any(|l| is_virtual(l.product_type));
        let virtual_only = !lines.is_empty() && lines.iter().all(|l| is_virtual(l.product_type));
        let auto_delivered = has_virtual && virtual_stock::can_auto_deliver(&order.order_no, &mut tx).await?;
        if auto_delivered {
            virtual_stock::deliver_auto(&order.order_no, &mut tx).await?;
        }
        let new_status = match (virtual_only, auto_delivered, order.has_shipping_info()) {
            (true, true, _) => OrderStatusType::Shipped,
            (true, false, _) => OrderStatusType::Pending,
            (false, _, true) => OrderStatusType::Pending,
            (false, _, false) => OrderStatusType::Draft,
        };
        check_transition(order.status, new_status)?;
        let physical_units: i64 =
            lines.iter().filter(|l| l.product_type == ProductType::Physical).map(|l| l.quantity).sum();
        if physical_units > 0 {
            serials::issue_serials(order.id, physical_units, &mut tx).await?;
        }
        let paid_at = payment.paid_at;
        payments::insert_order_payment(order.id, payment, &mut tx).await?;
        let order = orders::mark_paid(order.id, new_status, paid_at, &mut tx).await?;
        payments::delete_polling_task(order.id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} marked as paid. Status is now {}", order.order_no, order.status);
        Ok(PaidTransition::Applied { order, auto_delivered })
    }

    async fn update_shipping_info(&self, order_id: i64, info: ShippingInfo) -> Result<Order, OrderFlowError> {
        if !info.is_complete() {
            return Err(OrderFlowError::ValidationError("Receiver name and address are required".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        let order = match order.status {
            OrderStatusType::PendingPayment | OrderStatusType::Pending => {
                orders::update_receiver(order.id, &info, &mut tx).await?
            },
            OrderStatusType::Draft => {
                check_transition(order.status, OrderStatusType::Pending)?;
                orders::update_receiver(order.id, &info, &mut tx).await?;
                orders::update_status(order.id, OrderStatusType::Pending, &mut tx).await?
            },
            status => {
                return Err(OrderFlowError::OrderModificationForbidden { from: status, to: OrderStatusType::Pending })
            },
        };
        tx.commit().await?;
        Ok(order)
    }

    async fn assign_tracking(&self, order_id: i64, tracking_no: &str, operator: &str) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        if order.status != OrderStatusType::Pending {
            return Err(match order.status {
                OrderStatusType::Shipped => OrderFlowError::OrderModificationNoOp,
                from => OrderFlowError::OrderModificationForbidden { from, to: OrderStatusType::Shipped },
            });
        }
        let allocations = orders::fetch_allocations(order.id, &mut tx).await?;
        for alloc in allocations.iter().filter(|a| a.pool_kind == PoolKind::Physical) {
            let Some(pool_id) = alloc.pool_id else { continue };
            let token = order.order_no.line_token(alloc.line_index);
            // A missing ledger entry does not block shipping. Database failures still abort it.
            match pools::deduct(pool_id, alloc.quantity, &token, &mut tx).await {
                Ok(_) => {},
                Err(e @ InventoryError::DatabaseError(_)) => return Err(e.into()),
                Err(e) => {
                    let order_no = &order.order_no;
                    warn!("🗃️ Could not deduct {token} from pool {pool_id} while shipping order {order_no}. {e}");
                },
            }
        }
        virtual_stock::deliver(&order.order_no, operator, &mut tx).await?;
        let order = orders::mark_shipped(order.id, Some(tracking_no), &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Order {} shipped with tracking number {tracking_no} by {operator}", order.order_no);
        Ok(order)
    }

    async fn deliver_order_virtual_stock(&self, order_id: i64, operator: &str) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        if !matches!(order.status, OrderStatusType::Pending | OrderStatusType::Shipped) {
            return Err(OrderFlowError::OrderModificationForbidden { from: order.status, to: OrderStatusType::Shipped });
        }
        let delivered = virtual_stock::deliver(&order.order_no, operator, &mut tx).await?;
        if delivered == 0 {
            return Err(OrderFlowError::NothingToDeliver(order.order_no));
        }
        let lines = orders::fetch_lines(order.id, &mut tx).await?;
        let virtual_only = lines.iter().all(|l| l.product_type == ProductType::Virtual);
        let order = if virtual_only && order.status == OrderStatusType::Pending {
            orders::mark_shipped(order.id, None, &mut tx).await?
        } else {
            order
        };
        tx.commit().await?;
        Ok(order)
    }

    async fn complete_order(&self, order_id: i64) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        check_transition(order.status, OrderStatusType::Completed)?;
        if let Some(promo_id) = order.promo_code_id {
            promo_codes::consume(promo_id, &mut tx).await?;
        }
        let order = orders::mark_completed(order.id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn request_resubmit(&self, order_id: i64, reason: &str) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        check_transition(order.status, OrderStatusType::NeedResubmit)?;
        let order = orders::set_status_with_remark(order.id, OrderStatusType::NeedResubmit, reason, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn resubmit_order(&self, order_id: i64, info: ShippingInfo) -> Result<Order, OrderFlowError> {
        if !info.is_complete() {
            return Err(OrderFlowError::ValidationError("Receiver name and address are required".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        if order.status != OrderStatusType::NeedResubmit {
            return Err(OrderFlowError::OrderModificationForbidden { from: order.status, to: OrderStatusType::Pending });
        }
        orders::update_receiver(order.id, &info, &mut tx).await?;
        let order = orders::update_status(order.id, OrderStatusType::Pending, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn cancel_order(&self, order_id: i64, remark: &str) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        check_transition(order.status, OrderStatusType::Cancelled)?;
        orders::release_order_stock(&order, true, &mut tx).await?;
        serials::delete_serials(order.id, &mut tx).await?;
        payments::delete_polling_task(order.id, &mut tx).await?;
        let order = orders::set_status_with_remark(order.id, OrderStatusType::Cancelled, remark, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Order {} cancelled. {remark}", order.order_no);
        Ok(order)
    }

    async fn mark_order_refunded(&self, order_id: i64, remark: &str) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        check_transition(order.status, OrderStatusType::Refunded)?;
        // A completed order has already converted its promo hold into a use
        let release_promo = order.status != OrderStatusType::Completed;
        orders::release_order_stock(&order, release_promo, &mut tx).await?;
        let order = orders::set_status_with_remark(order.id, OrderStatusType::Refunded, remark, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Order {} refunded. {remark}", order.order_no);
        Ok(order)
    }

    async fn delete_order(&self, order_id: i64) -> Result<(), OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        match order.status {
            OrderStatusType::PendingPayment | OrderStatusType::Draft => {
                orders::release_order_stock(&order, true, &mut tx).await?;
            },
            OrderStatusType::Cancelled => {},
            _ => return Err(OrderFlowError::CannotDelete(order.order_no)),
        }
        orders::delete_order(order.id, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Order {} deleted", order.order_no);
        Ok(())
    }

    async fn issue_serials(&self, order_id: i64) -> Result<Vec<OrderSerial>, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?;
        if matches!(order.status, OrderStatusType::Cancelled | OrderStatusType::Refunded) {
            return Err(OrderFlowError::OrderModificationForbidden { from: order.status, to: order.status });
        }
        let lines = orders::fetch_lines(order.id, &mut tx).await?;
        let units = lines.iter().filter(|l| l.product_type == ProductType::Physical).map(|l| l.quantity).sum();
        let serials = serials::issue_serials(order.id, units, &mut tx).await?;
        tx.commit().await?;
        Ok(serials)
    }
}

impl PollingTaskStore for SqliteDatabase {
    async fn save_polling_task(&self, task: &PollingTask) -> Result<(), PollingError> {
        let mut tx = self.pool.begin().await?;
        payments::save_polling_task(task, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_polling_task(&self, order_id: i64) -> Result<(), PollingError> {
        let mut tx = self.pool.begin().await?;
        payments::delete_polling_task(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_polling_tasks(&self) -> Result<Vec<PollingTask>, PollingError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_polling_tasks(&mut conn).await?)
    }
}
