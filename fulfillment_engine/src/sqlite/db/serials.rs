use log::*;
use sqlx::SqliteConnection;

use crate::{db_types::OrderSerial, helpers::new_serial};

pub async fn fetch_serials(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderSerial>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_serials WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

/// Issues `count` serial numbers for the order, unless it already has some, in which case those are returned.
pub async fn issue_serials(
    order_id: i64,
    count: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderSerial>, sqlx::Error> {
    let existing = fetch_serials(order_id, conn).await?;
    if !existing.is_empty() {
        return Ok(existing);
    }
    let mut serials = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let serial: OrderSerial =
            sqlx::query_as("INSERT INTO order_serials (order_id, serial) VALUES ($1, $2) RETURNING *")
                .bind(order_id)
                .bind(new_serial())
                .fetch_one(&mut *conn)
                .await?;
        serials.push(serial);
    }
    debug!("🔄️ Issued {} serial numbers for order {order_id}", serials.len());
    Ok(serials)
}

pub async fn delete_serials(order_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM order_serials WHERE order_id = $1").bind(order_id).execute(conn).await?;
    Ok(result.rows_affected())
}
