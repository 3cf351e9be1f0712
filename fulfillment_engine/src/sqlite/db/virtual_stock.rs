//! Virtual stock pools: lists of pre-generated, single-use items such as card codes or account credentials.
//!
//! An item moves `available` → `reserved` (bound to an order number) → `sold`, or back to `available` if the order
//! is cancelled. `invalid` items are never handed out.
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use super::bindings;
use crate::{
    db_types::{
        Attributes,
        DeliveryOrder,
        NewVirtualItem,
        OrderNo,
        VirtualPool,
        VirtualPoolStats,
        VirtualStockItem,
        VirtualStockStatus,
    },
    traits::{AllocationError, InventoryError},
};

pub async fn insert_pool(
    name: &str,
    description: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<VirtualPool, sqlx::Error> {
    let pool: VirtualPool =
        sqlx::query_as("INSERT INTO virtual_pools (name, description) VALUES ($1, $2) RETURNING *")
            .bind(name)
            .bind(description)
            .fetch_one(conn)
            .await?;
    debug!("📦️ Virtual pool '{}' created with id {}", pool.name, pool.id);
    Ok(pool)
}

pub async fn fetch_pool(id: i64, conn: &mut SqliteConnection) -> Result<Option<VirtualPool>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM virtual_pools WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_pools(conn: &mut SqliteConnection) -> Result<Vec<VirtualPool>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM virtual_pools ORDER BY id").fetch_all(conn).await
}

/// Adds the items to the pool as `available`. Call this inside a transaction so that a batch is imported whole.
pub async fn import_items(
    pool_id: i64,
    items: Vec<NewVirtualItem>,
    batch_no: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let mut count = 0;
    for item in items {
        let result = sqlx::query(
            "INSERT INTO virtual_stock_items (pool_id, content, remark, batch_no) VALUES ($1, $2, $3, $4)",
        )
        .bind(pool_id)
        .bind(item.content)
        .bind(item.remark)
        .bind(batch_no)
        .execute(&mut *conn)
        .await?;
        count += result.rows_affected();
    }
    info!("📦️ Imported {count} items into virtual pool {pool_id} as batch {batch_no}");
    Ok(count)
}

pub async fn fetch_items(
    pool_id: i64,
    status: Option<VirtualStockStatus>,
    conn: &mut SqliteConnection,
) -> Result<Vec<VirtualStockItem>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM virtual_stock_items WHERE pool_id = ");
    builder.push_bind(pool_id);
    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    builder.push(" ORDER BY id");
    builder.build_query_as::<VirtualStockItem>().fetch_all(conn).await
}

pub async fn fetch_items_for_order(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Vec<VirtualStockItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM virtual_stock_items WHERE order_no = $1 ORDER BY id")
        .bind(order_no.as_str())
        .fetch_all(conn)
        .await
}

pub async fn pool_stats(pool_id: i64, conn: &mut SqliteConnection) -> Result<VirtualPoolStats, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(status = 'available'), 0) AS available,
            COALESCE(SUM(status = 'reserved'), 0) AS reserved,
            COALESCE(SUM(status = 'sold'), 0) AS sold,
            COALESCE(SUM(status = 'invalid'), 0) AS invalid
        FROM virtual_stock_items WHERE pool_id = $1
        "#,
    )
    .bind(pool_id)
    .fetch_one(conn)
    .await
}

pub async fn invalidate_item(item_id: i64, conn: &mut SqliteConnection) -> Result<VirtualStockItem, InventoryError> {
    let item: Option<VirtualStockItem> = sqlx::query_as(
        "UPDATE virtual_stock_items SET status = 'invalid', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND status = \
         'available' RETURNING *",
    )
    .bind(item_id)
    .fetch_optional(conn)
    .await?;
    item.ok_or(InventoryError::VirtualItemNotAvailable(item_id))
}

/// Reserves `quantity` available items for the order, drawn in `delivery_order` from the pools bound to the catalog
/// item under `attributes` (see [`bindings::virtual_pools_for_item`]). Inactive pools are skipped.
///
/// The draw is a single statement. If fewer than `quantity` items could be reserved an error is returned, and the
/// caller's transaction must be rolled back to return them.
pub async fn allocate(
    catalog_item_id: i64,
    attributes: &Attributes,
    quantity: i64,
    order_no: &OrderNo,
    delivery_order: DeliveryOrder,
    conn: &mut SqliteConnection,
) -> Result<Vec<VirtualStockItem>, InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity(quantity));
    }
    let pools = bindings::virtual_pools_for_item(catalog_item_id, attributes, conn).await?;
    if pools.is_empty() {
        return Err(AllocationError::NoMatchingConfiguration.into());
    }
    let mut builder = QueryBuilder::new(
        "UPDATE virtual_stock_items SET status = 'reserved', reserved_at = CURRENT_TIMESTAMP, updated_at = \
         CURRENT_TIMESTAMP, order_no = ",
    );
    builder.push_bind(order_no.as_str().to_string());
    builder.push(
        " WHERE id IN (SELECT id FROM virtual_stock_items WHERE status = 'available' AND pool_id IN (SELECT id FROM \
         virtual_pools WHERE is_active = 1) AND pool_id IN (",
    );
    let mut ids = builder.separated(", ");
    for pool_id in &pools {
        ids.push_bind(*pool_id);
    }
    builder.push(format!(") ORDER BY {} LIMIT ", delivery_order.order_by_clause()));
    builder.push_bind(quantity);
    builder.push(") RETURNING *");
    let items = builder.build_query_as::<VirtualStockItem>().fetch_all(conn).await?;
    let got = items.len() as i64;
    if got < quantity {
        debug!("📦️ Only {got} of {quantity} virtual items could be reserved for order {order_no}");
        return Err(InventoryError::InsufficientVirtualStock { requested: quantity, available: got });
    }
    debug!("📦️ Reserved {got} virtual items from pools {pools:?} for order {order_no} ({delivery_order} first)");
    Ok(items)
}

pub async fn deliver(order_no: &OrderNo, operator: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE virtual_stock_items SET
            status = 'sold',
            delivered_at = CURRENT_TIMESTAMP,
            delivered_by = $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $2 AND status = 'reserved'
        "#,
    )
    .bind(operator)
    .bind(order_no.as_str())
    .execute(conn)
    .await?;
    let count = result.rows_affected();
    if count > 0 {
        info!("📦️ {count} virtual items delivered for order {order_no} by {operator}");
    }
    Ok(count)
}

const AUTO_DELIVERY_POOLS: &str = r#"
    SELECT b.pool_id FROM bindings b JOIN catalog_items c ON c.id = b.catalog_item_id
    WHERE b.pool_kind = 'virtual' AND c.auto_delivery = 1
"#;

/// Delivers the order's reserved items that sit in pools bound to auto-delivery catalog items.
pub async fn deliver_auto(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE virtual_stock_items SET
            status = 'sold',
            delivered_at = CURRENT_TIMESTAMP,
            delivered_by = 'system',
            updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $1 AND status = 'reserved' AND pool_id IN ({AUTO_DELIVERY_POOLS})
        "#
    );
    let result = sqlx::query(&sql).bind(order_no.as_str()).execute(conn).await?;
    let count = result.rows_affected();
    if count > 0 {
        info!("📦️ {count} virtual items auto-delivered for order {order_no}");
    }
    Ok(count)
}

pub async fn release(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE virtual_stock_items SET
            status = 'available',
            order_no = NULL,
            reserved_at = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE order_no = $1 AND status = 'reserved'
        "#,
    )
    .bind(order_no.as_str())
    .execute(conn)
    .await?;
    let count = result.rows_affected();
    if count > 0 {
        debug!("📦️ {count} virtual items returned to their pools from order {order_no}");
    }
    Ok(count)
}

pub async fn count_reserved(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM virtual_stock_items WHERE order_no = $1 AND status = 'reserved'")
        .bind(order_no.as_str())
        .fetch_one(conn)
        .await
}

/// True if the order has reserved items, and all of them can be delivered automatically.
pub async fn can_auto_deliver(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let reserved = count_reserved(order_no, conn).await?;
    if reserved == 0 {
        return Ok(false);
    }
    let sql = format!(
        "SELECT COUNT(*) FROM virtual_stock_items WHERE order_no = $1 AND status = 'reserved' AND pool_id IN \
         ({AUTO_DELIVERY_POOLS})"
    );
    let auto: i64 = sqlx::query_scalar(&sql).bind(order_no.as_str()).fetch_one(conn).await?;
    Ok(auto == reserved)
}
