//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open an atomic transaction and pass `&mut tx` through to
//! the functions without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod bindings;
pub mod catalog;
pub mod orders;
pub mod payments;
pub mod pools;
pub mod promo_codes;
pub mod serials;
pub mod virtual_stock;

const SQLITE_DB_URL: &str = "sqlite://data/fulfillment.db";

pub fn db_url() -> String {
    let result = env::var("FFE_DATABASE_URL").unwrap_or_else(|_| {
        info!("FFE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
