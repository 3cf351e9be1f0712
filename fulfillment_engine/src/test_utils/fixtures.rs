//! Seed data for tests. Everything here panics on failure.
use chrono::{DateTime, Utc};

use crate::{
    db_types::{
        AttributeDef,
        Attributes,
        CatalogItem,
        NewBinding,
        NewCatalogItem,
        NewPaymentMethod,
        NewStockPool,
        PaymentMethod,
        PoolKind,
        ProductType,
        StockPool,
        VirtualPool,
    },
    ffe_api::inventory_api::parse_import_text,
    traits::{InventoryManagement, OrderManagement},
    SqliteDatabase,
};

pub async fn physical_item(db: &SqliteDatabase, sku: &str, user_select: &[&str], blind_box: &[&str]) -> CatalogItem {
    let mut item = NewCatalogItem::new(sku, &format!("Product {sku}"), ProductType::Physical);
    for name in user_select {
        item = item.with_attribute(AttributeDef::user_select(name));
    }
    for name in blind_box {
        item = item.with_attribute(AttributeDef::blind_box(name));
    }
    db.create_catalog_item(item).await.unwrap_or_else(|e| panic!("Error creating catalog item {sku}. {e}"))
}

pub async fn virtual_item(db: &SqliteDatabase, sku: &str, auto_delivery: bool) -> CatalogItem {
    let item =
        NewCatalogItem::new(sku, &format!("Product {sku}"), ProductType::Virtual).with_auto_delivery(auto_delivery);
    db.create_catalog_item(item).await.unwrap_or_else(|e| panic!("Error creating catalog item {sku}. {e}"))
}

/// Creates a physical pool and binds it to `item` under `attributes`.
pub async fn bound_pool(db: &SqliteDatabase, item: &CatalogItem, stock: i64, attributes: Attributes) -> StockPool {
    bound_random_pool(db, item, stock, attributes, None).await
}

/// As [`bound_pool`], but a `priority` makes the binding eligible for blind-box draws with that weight.
pub async fn bound_random_pool(
    db: &SqliteDatabase,
    item: &CatalogItem,
    stock: i64,
    attributes: Attributes,
    priority: Option<i64>,
) -> StockPool {
    let name = format!("{} {attributes}", item.sku);
    let pool = NewStockPool::new(&name, stock).with_attributes(attributes.clone());
    let pool = db.create_stock_pool(pool).await.unwrap_or_else(|e| panic!("Error creating stock pool {name}. {e}"));
    // Surface storage errors before binding
    match db.fetch_stock_pool(pool.id).await {
        Ok(Some(_)) => {},
        Ok(None) => panic!("Stock pool {} was created but cannot be read back", pool.id),
        Err(e) => panic!("Error reading back stock pool {}. {e}", pool.id),
    }
    let mut binding = NewBinding::new(item.id, PoolKind::Physical, pool.id, attributes);
    if let Some(p) = priority {
        binding = binding.random(p);
    }
    db.create_binding(binding)
        .await
        .unwrap_or_else(|e| panic!("Error binding stock pool {} to {}. {e}", pool.id, item.sku));
    pool
}

/// Creates a virtual pool holding one item per line of `codes` and binds it to `item` under `attributes`.
pub async fn bound_virtual_pool(
    db: &SqliteDatabase,
    item: &CatalogItem,
    codes: &str,
    attributes: Attributes,
) -> VirtualPool {
    let pool = db
        .create_virtual_pool(&format!("{} codes", item.sku), None)
        .await
        .unwrap_or_else(|e| panic!("Error creating virtual pool for {}. {e}", item.sku));
    db.import_virtual_items(pool.id, parse_import_text(codes), "test-batch")
        .await
        .expect("Error importing virtual items");
    let binding = NewBinding::new(item.id, PoolKind::Virtual, pool.id, attributes);
    db.create_binding(binding)
        .await
        .unwrap_or_else(|e| panic!("Error binding virtual pool {} to {}. {e}", pool.id, item.sku));
    pool
}

pub async fn payment_method(db: &SqliteDatabase, poll_interval_secs: i64) -> PaymentMethod {
    let method = NewPaymentMethod::new("test-pay").with_poll_interval(poll_interval_secs);
    db.create_payment_method(method).await.expect("Error creating payment method")
}

/// Rewrites an order's creation time, so that time-based sweeps can be tested without waiting.
pub async fn backdate_order(db: &SqliteDatabase, order_id: i64, created_at: DateTime<Utc>) {
    sqlx::query("UPDATE orders SET created_at = $1 WHERE id = $2")
        .bind(created_at)
        .bind(order_id)
        .execute(db.pool())
        .await
        .expect("Error backdating order");
}
