use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{
        Attributes,
        Binding,
        CatalogItem,
        InventoryLog,
        NewBinding,
        NewCatalogItem,
        NewStockPool,
        NewVirtualItem,
        StockPool,
        VirtualPool,
        VirtualPoolStats,
        VirtualStockItem,
        VirtualStockStatus,
    },
    ffe_api::allocation::{available_for_selection, total_available},
    helpers::{batch_number, normalize_attributes},
    traits::{AdjustOutcome, AdjustRequest, InventoryError, InventoryManagement, LedgerOutcome, PoolQueryFilter},
};

/// `InventoryApi` is the administrative and read-side API for stock: the catalog read model, bindings, physical pools
/// with their ledger, and virtual pools.
pub struct InventoryApi<B> {
    db: B,
}

impl<B> Debug for InventoryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InventoryApi")
    }
}

impl<B> InventoryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> InventoryApi<B>
where B: InventoryManagement
{
    pub fn db(&self) -> &B {
        &self.db
    }

    //------------------------------------------   Catalog   ----------------------------------------------------------
    pub async fn create_catalog_item(&self, item: NewCatalogItem) -> Result<CatalogItem, InventoryError> {
        self.db.create_catalog_item(item).await
    }

    pub async fn catalog_item(&self, sku: &str) -> Result<CatalogItem, InventoryError> {
        self.db
            .fetch_catalog_item_by_sku(sku.trim())
            .await?
            .ok_or_else(|| InventoryError::CatalogItemNotFound(sku.to_string()))
    }

    pub async fn set_catalog_item_active(&self, id: i64, active: bool) -> Result<CatalogItem, InventoryError> {
        self.db.set_catalog_item_active(id, active).await
    }

    //------------------------------------------   Bindings  ----------------------------------------------------------
    /// Binds a catalog item to a pool. Attribute keys and values are trimmed, and empty entries dropped, before the
    /// combination is hashed.
    pub async fn create_binding(&self, binding: NewBinding) -> Result<Binding, InventoryError> {
        let binding = NewBinding { attributes: normalize_attributes(&binding.attributes), ..binding };
        self.db.create_binding(binding).await
    }

    pub async fn bindings_for(&self, sku: &str) -> Result<Vec<Binding>, InventoryError> {
        let item = self.catalog_item(sku).await?;
        self.db.fetch_bindings(item.id).await
    }

    pub async fn update_binding(&self, id: i64, is_random: bool, priority: i64) -> Result<Binding, InventoryError> {
        self.db.update_binding(id, is_random, priority).await
    }

    pub async fn delete_binding(&self, id: i64) -> Result<(), InventoryError> {
        self.db.delete_binding(id).await
    }

    //------------------------------------------   Availability  ------------------------------------------------------
    /// The total number of units that can currently be bought for the catalog item, across every pool it is bound to.
    ///
    /// This is a lock-free read, suitable for display only.
    pub async fn total_available_stock(&self, sku: &str) -> Result<i64, InventoryError> {
        let item = self.catalog_item(sku).await?;
        let candidates = self.db.fetch_binding_candidates(item.id, item.product_type.pool_kind()).await?;
        Ok(total_available(&candidates))
    }

    /// The number of units available for a (possibly partial) attribute selection. Lock-free, for display only.
    pub async fn available_stock_for_selection(
        &self,
        sku: &str,
        selection: &Attributes,
    ) -> Result<i64, InventoryError> {
        let item = self.catalog_item(sku).await?;
        let candidates = self.db.fetch_binding_candidates(item.id, item.product_type.pool_kind()).await?;
        Ok(available_for_selection(&candidates, &normalize_attributes(selection)))
    }

    //------------------------------------------   Stock pools  -------------------------------------------------------
    pub async fn create_pool(&self, pool: NewStockPool) -> Result<StockPool, InventoryError> {
        if pool.stock < 0 || pool.available_quantity.unwrap_or(0) < 0 {
            return Err(InventoryError::InvalidQuantity(pool.stock.min(pool.available_quantity.unwrap_or(0))));
        }
        self.db.create_stock_pool(pool).await
    }

    pub async fn pool(&self, id: i64) -> Result<StockPool, InventoryError> {
        self.db.fetch_stock_pool(id).await?.ok_or(InventoryError::PoolNotFound(id))
    }

    pub async fn pools(&self, filter: PoolQueryFilter) -> Result<Vec<StockPool>, InventoryError> {
        self.db.search_stock_pools(filter).await
    }

    pub async fn set_pool_active(&self, id: i64, active: bool) -> Result<StockPool, InventoryError> {
        self.db.set_stock_pool_active(id, active).await
    }

    pub async fn delete_pool(&self, id: i64) -> Result<(), InventoryError> {
        self.db.delete_stock_pool(id).await
    }

    pub async fn inventory_logs(&self, pool_id: i64) -> Result<Vec<InventoryLog>, InventoryError> {
        self.db.fetch_inventory_logs(pool_id).await
    }

    //------------------------------------------   Ledger  ------------------------------------------------------------
    pub async fn reserve(
        &self,
        pool_id: i64,
        quantity: i64,
        correlation_id: &str,
    ) -> Result<LedgerOutcome, InventoryError> {
        self.db.reserve(pool_id, quantity, correlation_id).await
    }

    pub async fn deduct(
        &self,
        pool_id: i64,
        quantity: i64,
        correlation_id: &str,
    ) -> Result<LedgerOutcome, InventoryError> {
        self.db.deduct(pool_id, quantity, correlation_id).await
    }

    pub async fn release_reserve(
        &self,
        pool_id: i64,
        quantity: i64,
        correlation_id: &str,
    ) -> Result<LedgerOutcome, InventoryError> {
        self.db.release_reserve(pool_id, quantity, correlation_id).await
    }

    pub async fn adjust(&self, request: AdjustRequest) -> Result<AdjustOutcome, InventoryError> {
        let outcome = self.db.adjust_by_delta(request).await?;
        if let AdjustOutcome::Rejected(reason) = &outcome {
            info!("📦️ Stock adjustment rejected. {reason}");
        }
        Ok(outcome)
    }

    //------------------------------------------   Virtual stock  -----------------------------------------------------
    pub async fn create_virtual_pool(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<VirtualPool, InventoryError> {
        self.db.create_virtual_pool(name, description).await
    }

    pub async fn virtual_pools(&self) -> Result<Vec<VirtualPool>, InventoryError> {
        self.db.fetch_virtual_pools().await
    }

    /// Imports one virtual item per line of `text`. Each line is `content` or `content,remark`. Blank lines are
    /// skipped. All the items share a batch number derived from the current time. Returns the number imported.
    pub async fn import_from_text(&self, pool_id: i64, text: &str) -> Result<u64, InventoryError> {
        let items = parse_import_text(text);
        if items.is_empty() {
            return Err(InventoryError::InvalidImport("The import contains no items".to_string()));
        }
        let batch = batch_number(Utc::now());
        self.db.import_virtual_items(pool_id, items, &batch).await
    }

    pub async fn virtual_items(
        &self,
        pool_id: i64,
        status: Option<VirtualStockStatus>,
    ) -> Result<Vec<VirtualStockItem>, InventoryError> {
        self.db.fetch_virtual_items(pool_id, status).await
    }

    pub async fn virtual_pool_stats(&self, pool_id: i64) -> Result<VirtualPoolStats, InventoryError> {
        self.db.fetch_virtual_pool(pool_id).await?.ok_or(InventoryError::VirtualPoolNotFound(pool_id))?;
        self.db.virtual_pool_stats(pool_id).await
    }

    pub async fn invalidate_item(&self, item_id: i64) -> Result<VirtualStockItem, InventoryError> {
        self.db.invalidate_virtual_item(item_id).await
    }
}

/// Splits import text into items. The remark is everything after the first comma.
pub fn parse_import_text(text: &str) -> Vec<NewVirtualItem> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (content, remark) = match line.split_once(',') {
                Some((c, r)) => (c.trim(), Some(r.trim()).filter(|r| !r.is_empty())),
                None => (line, None),
            };
            if content.is_empty() {
                return None;
            }
            Some(NewVirtualItem { content: content.to_string(), remark: remark.map(String::from) })
        })
        .collect()
}
