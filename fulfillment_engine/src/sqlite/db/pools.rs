//! Stock pools and the physical reservation ledger.
//!
//! Every movement starts by locking the pool row with [`lock_pool`], which is a no-op write. Inside a transaction,
//! that means the pool's counts cannot change under us until the transaction ends.
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{InventoryLog, InventoryLogType, NewStockPool, StockPool},
    traits::{AdjustOutcome, AdjustRequest, InventoryError, LedgerOutcome, PoolQueryFilter},
};

pub async fn insert_pool(pool: NewStockPool, conn: &mut SqliteConnection) -> Result<StockPool, InventoryError> {
    let available = pool.available_quantity.unwrap_or(pool.stock);
    let pool: StockPool = sqlx::query_as(
        r#"
            INSERT INTO stock_pools (name, sku, attributes, stock, available_quantity, safety_stock)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(pool.name)
    .bind(pool.sku)
    .bind(pool.attributes)
    .bind(pool.stock.max(0))
    .bind(available.max(0))
    .bind(pool.safety_stock)
    .fetch_one(conn)
    .await?;
    debug!("📦️ Stock pool '{}' created with id {} and {} units", pool.name, pool.id, pool.stock);
    Ok(pool)
}

pub async fn fetch_pool(id: i64, conn: &mut SqliteConnection) -> Result<Option<StockPool>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM stock_pools WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Takes the write lock on the pool and returns its current state.
pub async fn lock_pool(id: i64, conn: &mut SqliteConnection) -> Result<Option<StockPool>, sqlx::Error> {
    sqlx::query_as("UPDATE stock_pools SET updated_at = updated_at WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn search_pools(filter: PoolQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<StockPool>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM stock_pools WHERE 1=1");
    if filter.active_only {
        builder.push(" AND is_active = 1");
    }
    if filter.low_stock_only {
        builder.push(" AND (stock - sold_quantity - reserved_quantity) <= safety_stock");
    }
    if let Some(sku) = filter.sku {
        builder.push(" AND sku = ");
        builder.push_bind(sku);
    }
    builder.push(" ORDER BY id");
    trace!("🗃️ Executing query: {}", builder.sql());
    builder.build_query_as::<StockPool>().fetch_all(conn).await
}

pub async fn set_active(id: i64, active: bool, conn: &mut SqliteConnection) -> Result<Option<StockPool>, sqlx::Error> {
    sqlx::query_as("UPDATE stock_pools SET is_active = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
        .bind(active)
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn delete_pool(id: i64, conn: &mut SqliteConnection) -> Result<(), InventoryError> {
    let pool = lock_pool(id, conn).await?.ok_or(InventoryError::PoolNotFound(id))?;
    if !pool.is_deletable() {
        return Err(InventoryError::PoolNotDeletable(id));
    }
    sqlx::query("DELETE FROM bindings WHERE pool_kind = 'physical' AND pool_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM stock_pools WHERE id = $1").bind(id).execute(conn).await?;
    info!("📦️ Stock pool {id} deleted");
    Ok(())
}

pub async fn fetch_logs(pool_id: i64, conn: &mut SqliteConnection) -> Result<Vec<InventoryLog>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM inventory_logs WHERE pool_id = $1 ORDER BY id").bind(pool_id).fetch_all(conn).await
}

async fn has_log(
    pool_id: i64,
    kinds: &[InventoryLogType],
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM inventory_logs WHERE pool_id = ");
    builder.push_bind(pool_id);
    builder.push(" AND correlation_id = ");
    builder.push_bind(correlation_id.to_string());
    builder.push(" AND kind IN (");
    let mut list = builder.separated(", ");
    for kind in kinds {
        list.push_bind(*kind);
    }
    builder.push(")");
    let count = builder.build_query_scalar::<i64>().fetch_one(conn).await?;
    Ok(count > 0)
}

#[allow(clippy::too_many_arguments)]
async fn write_log(
    before: &StockPool,
    after: &StockPool,
    kind: InventoryLogType,
    quantity: i64,
    correlation_id: Option<&str>,
    operator: Option<&str>,
    reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO inventory_logs (
                pool_id, kind, quantity,
                stock_before, stock_after,
                available_before, available_after,
                reserved_before, reserved_after,
                sold_before, sold_after,
                correlation_id, operator, reason
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(before.id)
    .bind(kind)
    .bind(quantity)
    .bind(before.stock)
    .bind(after.stock)
    .bind(before.available_quantity)
    .bind(after.available_quantity)
    .bind(before.reserved_quantity)
    .bind(after.reserved_quantity)
    .bind(before.sold_quantity)
    .bind(after.sold_quantity)
    .bind(correlation_id)
    .bind(operator)
    .bind(reason)
    .execute(conn)
    .await?;
    Ok(())
}

/// Reserves `quantity` units against the pool.
///
/// The pool is locked and re-checked before the reservation is applied. A second call with the same correlation id
/// is a no-op.
pub async fn reserve(
    pool_id: i64,
    quantity: i64,
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<LedgerOutcome, InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity(quantity));
    }
    let before = lock_pool(pool_id, conn).await?.ok_or(InventoryError::PoolNotFound(pool_id))?;
    if has_log(pool_id, &[InventoryLogType::Reserve], correlation_id, conn).await? {
        debug!("📦️ Reservation {correlation_id} on pool {pool_id} was already applied");
        return Ok(LedgerOutcome::Replayed);
    }
    before.can_purchase(quantity)?;
    let after: StockPool = sqlx::query_as(
        "UPDATE stock_pools SET reserved_quantity = reserved_quantity + $1, updated_at = CURRENT_TIMESTAMP WHERE id = \
         $2 RETURNING *",
    )
    .bind(quantity)
    .bind(pool_id)
    .fetch_one(&mut *conn)
    .await?;
    write_log(&before, &after, InventoryLogType::Reserve, quantity, Some(correlation_id), None, None, conn).await?;
    let reserved = after.reserved_quantity;
    trace!("📦️ Reserved {quantity} in pool {pool_id} for {correlation_id}. Reserved is now {reserved}");
    Ok(LedgerOutcome::Applied(after))
}

/// Moves `quantity` units from reserved to sold.
///
/// Only a reservation made under the same correlation id can be deducted, and only once. Deducting a reservation that
/// has already been released is a no-op.
pub async fn deduct(
    pool_id: i64,
    quantity: i64,
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<LedgerOutcome, InventoryError> {
    let before = lock_pool(pool_id, conn).await?.ok_or(InventoryError::PoolNotFound(pool_id))?;
    let settled = [InventoryLogType::Deduct, InventoryLogType::Release];
    if has_log(pool_id, &settled, correlation_id, conn).await? {
        debug!("📦️ Reservation {correlation_id} on pool {pool_id} is already settled");
        return Ok(LedgerOutcome::Replayed);
    }
    if !has_log(pool_id, &[InventoryLogType::Reserve], correlation_id, conn).await? {
        return Err(InventoryError::ReservationNotFound(correlation_id.to_string()));
    }
    let quantity = quantity.min(before.reserved_quantity);
    let after: StockPool = sqlx::query_as(
        r#"
        UPDATE stock_pools SET
            reserved_quantity = reserved_quantity - $1,
            sold_quantity = sold_quantity + $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 RETURNING *"#,
    )
    .bind(quantity)
    .bind(pool_id)
    .fetch_one(&mut *conn)
    .await?;
    write_log(&before, &after, InventoryLogType::Deduct, quantity, Some(correlation_id), None, None, conn).await?;
    trace!("📦️ Deducted {quantity} in pool {pool_id} for {correlation_id}. Sold is now {}", after.sold_quantity);
    Ok(LedgerOutcome::Applied(after))
}

/// Returns `quantity` reserved units to the pool. The reserved count is clamped at zero.
///
/// Releasing a reservation that was never made, or that has already been deducted or released, is a no-op.
pub async fn release(
    pool_id: i64,
    quantity: i64,
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<LedgerOutcome, InventoryError> {
    let before = lock_pool(pool_id, conn).await?.ok_or(InventoryError::PoolNotFound(pool_id))?;
    let settled = [InventoryLogType::Deduct, InventoryLogType::Release];
    if has_log(pool_id, &settled, correlation_id, conn).await? ||
        !has_log(pool_id, &[InventoryLogType::Reserve], correlation_id, conn).await?
    {
        debug!("📦️ Nothing to release on pool {pool_id} for {correlation_id}");
        return Ok(LedgerOutcome::Replayed);
    }
    let after: StockPool = sqlx::query_as(
        "UPDATE stock_pools SET reserved_quantity = MAX(0, reserved_quantity - $1), updated_at = CURRENT_TIMESTAMP \
         WHERE id = $2 RETURNING *",
    )
    .bind(quantity)
    .bind(pool_id)
    .fetch_one(&mut *conn)
    .await?;
    write_log(&before, &after, InventoryLogType::Release, quantity, Some(correlation_id), None, None, conn).await?;
    let reserved = after.reserved_quantity;
    trace!("📦️ Released {quantity} in pool {pool_id} for {correlation_id}. Reserved is now {reserved}");
    Ok(LedgerOutcome::Applied(after))
}

/// Applies an administrative restock or correction.
///
/// The adjustment is rejected, with the reason, if it would leave the pool with negative counts, a purchasable ceiling
/// above the stock on hand, or fewer units than are already sold or reserved.
pub async fn adjust(request: AdjustRequest, conn: &mut SqliteConnection) -> Result<AdjustOutcome, InventoryError> {
    let AdjustRequest { pool_id, stock_delta, available_delta, operator, reason } = request;
    let before = lock_pool(pool_id, conn).await?.ok_or(InventoryError::PoolNotFound(pool_id))?;
    let stock = before.stock + stock_delta;
    let available = before.available_quantity + available_delta;
    let committed = before.sold_quantity + before.reserved_quantity;
    if stock < 0 {
        return Ok(AdjustOutcome::Rejected("Adjusted inventory cannot be negative".to_string()));
    }
    if available < 0 {
        return Ok(AdjustOutcome::Rejected("Adjusted available quantity cannot be negative".to_string()));
    }
    if available > stock {
        return Ok(AdjustOutcome::Rejected("Available quantity cannot exceed total stock".to_string()));
    }
    if stock < committed {
        return Ok(AdjustOutcome::Rejected(format!(
            "Adjusted inventory cannot be less than the {committed} units already sold or reserved"
        )));
    }
    let after: StockPool = sqlx::query_as(
        "UPDATE stock_pools SET stock = $1, available_quantity = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $3 \
         RETURNING *",
    )
    .bind(stock)
    .bind(available)
    .bind(pool_id)
    .fetch_one(&mut *conn)
    .await?;
    let quantity = stock_delta;
    write_log(&before, &after, InventoryLogType::Adjust, quantity, None, Some(&operator), Some(&reason), conn).await?;
    info!(
        "📦️ Pool {pool_id} adjusted by {operator}: stock {} -> {stock}, available {} -> {available}. {reason}",
        before.stock, before.available_quantity
    );
    Ok(AdjustOutcome::Applied(after))
}
