use thiserror::Error;

use crate::{
    db_types::{
        Attributes,
        Binding,
        CatalogItem,
        DeliveryOrder,
        InventoryLog,
        NewBinding,
        NewCatalogItem,
        NewStockPool,
        NewVirtualItem,
        OrderNo,
        PoolKind,
        StockCheckError,
        StockPool,
        VirtualPool,
        VirtualPoolStats,
        VirtualStockItem,
        VirtualStockStatus,
    },
    traits::data_objects::{AdjustOutcome, AdjustRequest, BindingCandidate, LedgerOutcome, PoolQueryFilter},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("No matching inventory configuration found")]
    NoMatchingConfiguration,
    #[error("This product configuration is unavailable")]
    Unavailable,
    #[error("Insufficient stock to allocate {0} units")]
    InsufficientStockForAllocation(i64),
    #[error("Please select a value for {0}")]
    MissingAttribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Catalog item {0} does not exist")]
    CatalogItemNotFound(String),
    #[error("Stock pool {0} does not exist")]
    PoolNotFound(i64),
    #[error("Virtual pool {0} does not exist")]
    VirtualPoolNotFound(i64),
    #[error("Binding {0} does not exist")]
    BindingNotFound(i64),
    #[error("This attribute combination is already bound to inventory, do not bind again")]
    DuplicateBinding,
    #[error("{0}")]
    StockCheck(#[from] StockCheckError),
    #[error("{0}")]
    Allocation(#[from] AllocationError),
    #[error("Stock pool {0} still has sold or reserved units and cannot be deleted")]
    PoolNotDeletable(i64),
    #[error("Insufficient virtual stock. Requested {requested}, but only {available} are available")]
    InsufficientVirtualStock { requested: i64, available: i64 },
    #[error("Nothing to import. {0}")]
    InvalidImport(String),
    #[error("Virtual item {0} is not available and cannot be invalidated")]
    VirtualItemNotAvailable(i64),
    #[error("Quantity must be greater than 0 (got {0})")]
    InvalidQuantity(i64),
    #[error("No reservation was made under {0}")]
    ReservationNotFound(String),
}

impl From<sqlx::Error> for InventoryError {
    fn from(e: sqlx::Error) -> Self {
        InventoryError::DatabaseError(e.to_string())
    }
}

/// Catalog read model, bindings, the physical reservation ledger and virtual stock pools.
#[allow(async_fn_in_trait)]
pub trait InventoryManagement: Clone {
    //------------------------------------------   Catalog   ----------------------------------------------------------
    async fn create_catalog_item(&self, item: NewCatalogItem) -> Result<CatalogItem, InventoryError>;

    async fn fetch_catalog_item(&self, id: i64) -> Result<Option<CatalogItem>, InventoryError>;

    async fn fetch_catalog_item_by_sku(&self, sku: &str) -> Result<Option<CatalogItem>, InventoryError>;

    async fn set_catalog_item_active(&self, id: i64, active: bool) -> Result<CatalogItem, InventoryError>;

    //------------------------------------------   Bindings  ----------------------------------------------------------
    /// Binds a catalog item to a pool under the normalized attribute combination in `binding`.
    ///
    /// Fails with [`InventoryError::DuplicateBinding`] if the catalog item already has a binding with the same
    /// attribute hash.
    async fn create_binding(&self, binding: NewBinding) -> Result<Binding, InventoryError>;

    async fn fetch_bindings(&self, catalog_item_id: i64) -> Result<Vec<Binding>, InventoryError>;

    async fn update_binding(&self, id: i64, is_random: bool, priority: i64) -> Result<Binding, InventoryError>;

    async fn delete_binding(&self, id: i64) -> Result<(), InventoryError>;

    /// A lock-free snapshot of every binding of the given kind for the catalog item, with its pool's current supply.
    async fn fetch_binding_candidates(
        &self,
        catalog_item_id: i64,
        kind: PoolKind,
    ) -> Result<Vec<BindingCandidate>, InventoryError>;

    //------------------------------------------   Stock pools  -------------------------------------------------------
    async fn create_stock_pool(&self, pool: NewStockPool) -> Result<StockPool, InventoryError>;

    async fn fetch_stock_pool(&self, id: i64) -> Result<Option<StockPool>, InventoryError>;

    async fn search_stock_pools(&self, filter: PoolQueryFilter) -> Result<Vec<StockPool>, InventoryError>;

    async fn set_stock_pool_active(&self, id: i64, active: bool) -> Result<StockPool, InventoryError>;

    /// Deletes the pool. Only permitted when it has no sold or reserved units.
    async fn delete_stock_pool(&self, id: i64) -> Result<(), InventoryError>;

    async fn fetch_inventory_logs(&self, pool_id: i64) -> Result<Vec<InventoryLog>, InventoryError>;

    //------------------------------------------   Ledger  ------------------------------------------------------------
    /// Reserves `quantity` units in the pool, provided the pool can supply them.
    async fn reserve(&self, pool_id: i64, quantity: i64, correlation_id: &str) -> Result<LedgerOutcome, InventoryError>;

    /// Moves `quantity` units from reserved to sold. Only a reservation made under `correlation_id` can be deducted.
    async fn deduct(&self, pool_id: i64, quantity: i64, correlation_id: &str) -> Result<LedgerOutcome, InventoryError>;

    /// Returns `quantity` reserved units to the pool. The reserved count never drops below zero.
    async fn release_reserve(
        &self,
        pool_id: i64,
        quantity: i64,
        correlation_id: &str,
    ) -> Result<LedgerOutcome, InventoryError>;

    /// Restock or correct a pool. Invalid adjustments are reported in the outcome rather than as errors.
    async fn adjust_by_delta(&self, request: AdjustRequest) -> Result<AdjustOutcome, InventoryError>;

    //------------------------------------------   Virtual stock  -----------------------------------------------------
    async fn create_virtual_pool(&self, name: &str, description: Option<String>)
        -> Result<VirtualPool, InventoryError>;

    async fn fetch_virtual_pool(&self, id: i64) -> Result<Option<VirtualPool>, InventoryError>;

    async fn fetch_virtual_pools(&self) -> Result<Vec<VirtualPool>, InventoryError>;

    /// Adds the items to the pool as `available`, tagged with `batch_no`. Returns the number of items added.
    async fn import_virtual_items(
        &self,
        pool_id: i64,
        items: Vec<NewVirtualItem>,
        batch_no: &str,
    ) -> Result<u64, InventoryError>;

    async fn fetch_virtual_items(
        &self,
        pool_id: i64,
        status: Option<VirtualStockStatus>,
    ) -> Result<Vec<VirtualStockItem>, InventoryError>;

    async fn fetch_virtual_items_for_order(&self, order_no: &OrderNo) -> Result<Vec<VirtualStockItem>, InventoryError>;

    async fn virtual_pool_stats(&self, pool_id: i64) -> Result<VirtualPoolStats, InventoryError>;

    /// Marks an available item as invalid, e.g. because the credential was found to be broken.
    async fn invalidate_virtual_item(&self, item_id: i64) -> Result<VirtualStockItem, InventoryError>;

    /// Reserves `quantity` available items for the order, drawn in `delivery_order`.
    ///
    /// The pool is the one bound to the item under exactly `attributes`, if any. Otherwise all of the item's virtual
    /// pools are candidates. Either every item is reserved, or none are.
    async fn allocate_virtual_stock(
        &self,
        catalog_item_id: i64,
        attributes: &Attributes,
        quantity: i64,
        order_no: &OrderNo,
        delivery_order: DeliveryOrder,
    ) -> Result<Vec<VirtualStockItem>, InventoryError>;

    /// Moves all of the order's reserved items to sold. Returns the number of items delivered.
    async fn deliver_virtual_stock(&self, order_no: &OrderNo, operator: &str) -> Result<u64, InventoryError>;

    /// Like [`Self::deliver_virtual_stock`], but only for items in pools bound to auto-delivery catalog items.
    async fn deliver_auto_delivery_stock(&self, order_no: &OrderNo) -> Result<u64, InventoryError>;

    /// Returns all of the order's reserved items to the pool. Returns the number of items released.
    async fn release_virtual_stock(&self, order_no: &OrderNo) -> Result<u64, InventoryError>;

    /// True only if the order has reserved items and every one of them belongs to an auto-delivery catalog item.
    async fn can_auto_deliver(&self, order_no: &OrderNo) -> Result<bool, InventoryError>;

    async fn has_pending_virtual_stock(&self, order_no: &OrderNo) -> Result<bool, InventoryError>;
}
