//! Promo code holds. An order puts one use of its code on hold when it is created. The hold becomes a use when the
//! order completes, and is released if the order is cancelled or refunded before that.
use log::*;
use sqlx::SqliteConnection;

use crate::{db_types::PromoCode, traits::OrderFlowError};

pub async fn insert_promo_code(code: &str, total: i64, conn: &mut SqliteConnection) -> Result<PromoCode, sqlx::Error> {
    sqlx::query_as("INSERT INTO promo_codes (code, total) VALUES ($1, $2) RETURNING *")
        .bind(code)
        .bind(total.max(0))
        .fetch_one(conn)
        .await
}

pub async fn fetch_promo_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<PromoCode>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM promo_codes WHERE code = $1").bind(code).fetch_optional(conn).await
}

/// Puts one use of the code on hold.
pub async fn reserve(code: &str, conn: &mut SqliteConnection) -> Result<PromoCode, OrderFlowError> {
    let promo: Option<PromoCode> = sqlx::query_as(
        "UPDATE promo_codes SET reserved = reserved + 1 WHERE code = $1 AND is_active = 1 AND total - reserved - used \
         > 0 RETURNING *",
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;
    match promo {
        Some(p) => {
            trace!("🔄️ Promo code {code} on hold. {} uses remaining", p.remaining());
            Ok(p)
        },
        None => match fetch_promo_code(code, conn).await? {
            Some(p) if p.is_active => Err(OrderFlowError::PromoCodeExhausted(code.to_string())),
            _ => Err(OrderFlowError::PromoCodeNotFound(code.to_string())),
        },
    }
}

pub async fn release(id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE promo_codes SET reserved = MAX(0, reserved - 1) WHERE id = $1").bind(id).execute(conn).await?;
    trace!("🔄️ Promo code {id} hold released");
    Ok(())
}

/// Converts a hold into a use.
pub async fn consume(id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE promo_codes SET reserved = MAX(0, reserved - 1), used = used + 1 WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    trace!("🔄️ Promo code {id} hold converted to a use");
    Ok(())
}
