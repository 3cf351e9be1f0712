//! Payment methods, payment records, and the durable payment polling task records.
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentMethod, OrderPayment, PaymentMethod, PollingTask, PollingTaskData},
    traits::{PaymentRecord, PollingError},
};

pub async fn insert_payment_method(
    method: NewPaymentMethod,
    conn: &mut SqliteConnection,
) -> Result<PaymentMethod, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO payment_methods (name, poll_interval_secs, check_url, refund_url)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(method.name)
    .bind(method.poll_interval_secs.max(0))
    .bind(method.check_url)
    .bind(method.refund_url)
    .fetch_one(conn)
    .await
}

pub async fn fetch_payment_method(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentMethod>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_methods WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn insert_order_payment(
    order_id: i64,
    payment: PaymentRecord,
    conn: &mut SqliteConnection,
) -> Result<OrderPayment, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO order_payments (order_id, payment_method_id, transaction_id, paid_at, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO UPDATE SET
                payment_method_id = excluded.payment_method_id,
                transaction_id = excluded.transaction_id,
                paid_at = excluded.paid_at,
                data = excluded.data
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(payment.payment_method_id)
    .bind(payment.transaction_id)
    .bind(payment.paid_at)
    .bind(payment.data)
    .fetch_one(conn)
    .await
}

pub async fn fetch_order_payment(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderPayment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_payments WHERE order_id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn delete_order_payment(order_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM order_payments WHERE order_id = $1").bind(order_id).execute(conn).await?;
    Ok(())
}

//--------------------------------------   Polling task records   -----------------------------------------------------

pub async fn save_polling_task(task: &PollingTask, conn: &mut SqliteConnection) -> Result<(), PollingError> {
    let data = serde_json::to_string(&PollingTaskData::from(task))
        .map_err(|e| PollingError::CorruptTask(task.order_id, e.to_string()))?;
    sqlx::query(
        r#"
            INSERT INTO payment_polling_tasks (order_id, data) VALUES ($1, $2)
            ON CONFLICT (order_id) DO UPDATE SET data = excluded.data, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(task.order_id)
    .bind(data)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_polling_task(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM payment_polling_tasks WHERE order_id = $1").bind(order_id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Loads every stored polling task. Records that cannot be decoded are deleted and skipped.
pub async fn fetch_polling_tasks(conn: &mut SqliteConnection) -> Result<Vec<PollingTask>, sqlx::Error> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT order_id, data FROM payment_polling_tasks ORDER BY order_id")
        .fetch_all(&mut *conn)
        .await?;
    let mut tasks = Vec::with_capacity(rows.len());
    for (order_id, data) in rows {
        match serde_json::from_str::<PollingTaskData>(&data) {
            Ok(d) => tasks.push(d.into_task(order_id)),
            Err(e) => {
                warn!("💳️ Dropping the stored polling task for order {order_id}. It could not be decoded. {e}");
                delete_polling_task(order_id, conn).await?;
            },
        }
    }
    Ok(tasks)
}
