use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use super::{payments, pools, promo_codes, serials, virtual_stock};
use crate::{
    db_types::{LineAllocation, Order, OrderLine, OrderNo, OrderStatusType, PoolKind},
    order_objects::{OrderPlan, OrderQueryFilter, PlannedLine, ShippingInfo},
    traits::OrderFlowError,
};

/// Inserts the order header in `pending_payment`. This is not atomic on its own. Embed it in a transaction along with
/// the line items and reservations.
pub async fn insert_order(
    plan: &OrderPlan,
    promo_code_id: Option<i64>,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let receiver = plan.receiver.clone().unwrap_or_default();
    let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_no,
                customer_id,
                receiver_name,
                receiver_phone,
                receiver_address,
                promo_code_id,
                payment_method_id,
                remark,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *;
        "#,
    )
    .bind(plan.order_no.as_str())
    .bind(&plan.customer_id)
    .bind(non_empty(receiver.receiver_name))
    .bind(receiver.receiver_phone)
    .bind(non_empty(receiver.receiver_address))
    .bind(promo_code_id)
    .bind(plan.payment_method_id)
    .bind(&plan.remark)
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} inserted with id {}", order.order_no, order.id);
    Ok(order)
}

pub async fn set_promo_code(order_id: i64, promo_code_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET promo_code_id = $1 WHERE id = $2")
        .bind(promo_code_id)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_line(
    order_id: i64,
    line: &PlannedLine,
    conn: &mut SqliteConnection,
) -> Result<OrderLine, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO order_lines
                (order_id, line_index, catalog_item_id, sku, name, product_type, quantity, attributes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(line.line_index)
    .bind(line.catalog_item_id)
    .bind(&line.sku)
    .bind(&line.name)
    .bind(line.product_type)
    .bind(line.quantity)
    .bind(line.visible_attributes.clone())
    .fetch_one(conn)
    .await
}

pub async fn insert_allocation(
    allocation: &LineAllocation,
    conn: &mut SqliteConnection,
) -> Result<LineAllocation, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO line_allocations (order_id, line_index, pool_kind, pool_id, quantity, actual_attributes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(allocation.order_id)
    .bind(allocation.line_index)
    .bind(allocation.pool_kind)
    .bind(allocation.pool_id)
    .bind(allocation.quantity)
    .bind(allocation.actual_attributes.clone())
    .fetch_one(conn)
    .await
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_order_by_order_no(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_no = $1").bind(order_no.as_str()).fetch_optional(conn).await
}

/// Takes the write lock on the order and returns its current state.
pub async fn lock_order(id: i64, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let order: Option<Order> = sqlx::query_as("UPDATE orders SET updated_at = updated_at WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    order.ok_or(OrderFlowError::OrderIdNotFound(id))
}

pub async fn fetch_lines(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY line_index")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_allocations(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<LineAllocation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM line_allocations WHERE order_id = $1 ORDER BY line_index")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

/// Fetches orders according to the criteria in the `OrderQueryFilter`, oldest first.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(cid) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(cid);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        let list = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({list})"));
    }
    if let Some(pm) = query.payment_method_id {
        where_clause.push("payment_method_id = ");
        where_clause.push_bind_unseparated(pm);
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    builder.build_query_as::<Order>().fetch_all(conn).await
}

pub async fn fetch_expired_orders(
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE status = 'pending_payment' AND created_at < $1 ORDER BY created_at")
        .bind(cutoff)
        .fetch_all(conn)
        .await
}

pub async fn fetch_pollable_orders(conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM orders WHERE status = 'pending_payment' AND payment_method_id IS NOT NULL ORDER BY created_at",
    )
    .fetch_all(conn)
    .await
}

pub async fn update_status(
    id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let order: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    order.ok_or(OrderFlowError::OrderIdNotFound(id))
}

pub async fn mark_paid(
    id: i64,
    status: OrderStatusType,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let shipped = status == OrderStatusType::Shipped;
    sqlx::query_as(
        r#"UPDATE orders SET
            status = $1,
            paid_at = $2,
            shipped_at = CASE WHEN $3 THEN $2 ELSE shipped_at END,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $4 RETURNING *"#,
    )
    .bind(status)
    .bind(paid_at)
    .bind(shipped)
    .bind(id)
    .fetch_one(conn)
    .await
}

pub async fn mark_shipped(
    id: i64,
    tracking_no: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    sqlx::query_as(
        r#"UPDATE orders SET
            status = 'shipped',
            tracking_no = COALESCE($1, tracking_no),
            shipped_at = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 RETURNING *"#,
    )
    .bind(tracking_no)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(conn)
    .await
}

pub async fn mark_completed(id: i64, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    sqlx::query_as(
        "UPDATE orders SET status = 'completed', completed_at = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 \
         RETURNING *",
    )
    .bind(Utc::now())
    .bind(id)
    .fetch_one(conn)
    .await
}

pub async fn update_receiver(id: i64, info: &ShippingInfo, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    sqlx::query_as(
        r#"UPDATE orders SET
            receiver_name = $1,
            receiver_phone = $2,
            receiver_address = $3,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $4 RETURNING *"#,
    )
    .bind(info.receiver_name.trim())
    .bind(info.receiver_phone.as_deref())
    .bind(info.receiver_address.trim())
    .bind(id)
    .fetch_one(conn)
    .await
}

pub async fn set_status_with_remark(
    id: i64,
    status: OrderStatusType,
    remark: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    sqlx::query_as(
        "UPDATE orders SET status = $1, remark = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $3 RETURNING *",
    )
        .bind(status)
        .bind(remark)
        .bind(id)
        .fetch_one(conn)
        .await
}

/// Returns every outstanding reservation the order holds: physical lines are released on the ledger, reserved
/// virtual items go back to their pools, and the promo code hold (if `release_promo`) is dropped.
///
/// Stock that has already been sold is left alone.
pub async fn release_order_stock(
    order: &Order,
    release_promo: bool,
    conn: &mut SqliteConnection,
) -> Result<(), OrderFlowError> {
    let allocations = fetch_allocations(order.id, conn).await?;
    for alloc in allocations.iter().filter(|a| a.pool_kind == PoolKind::Physical) {
        let Some(pool_id) = alloc.pool_id else { continue };
        let token = order.order_no.line_token(alloc.line_index);
        let outcome = pools::release(pool_id, alloc.quantity, &token, conn).await?;
        trace!("🔄️ Release of {token} on pool {pool_id}: {outcome:?}");
    }
    virtual_stock::release(&order.order_no, conn).await?;
    if release_promo {
        if let Some(promo_id) = order.promo_code_id {
            promo_codes::release(promo_id, conn).await?;
        }
    }
    Ok(())
}

/// Deletes the order and everything that hangs off it.
pub async fn delete_order(order_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    serials::delete_serials(order_id, conn).await?;
    payments::delete_polling_task(order_id, conn).await?;
    payments::delete_order_payment(order_id, conn).await?;
    sqlx::query("DELETE FROM line_allocations WHERE order_id = $1").bind(order_id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM order_lines WHERE order_id = $1").bind(order_id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM orders WHERE id = $1").bind(order_id).execute(conn).await?;
    Ok(())
}
