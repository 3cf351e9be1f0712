use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CatalogItem, NewCatalogItem},
    traits::InventoryError,
};

pub async fn insert_catalog_item(
    item: NewCatalogItem,
    conn: &mut SqliteConnection,
) -> Result<CatalogItem, InventoryError> {
    let item: CatalogItem = sqlx::query_as(
        r#"
            INSERT INTO catalog_items (sku, name, product_type, inventory_mode, attribute_defs, auto_delivery)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(item.sku)
    .bind(item.name)
    .bind(item.product_type)
    .bind(item.inventory_mode)
    .bind(item.attribute_defs)
    .bind(item.auto_delivery)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Catalog item {} created with id {}", item.sku, item.id);
    Ok(item)
}

pub async fn fetch_catalog_item(id: i64, conn: &mut SqliteConnection) -> Result<Option<CatalogItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM catalog_items WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_catalog_item_by_sku(
    sku: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<CatalogItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM catalog_items WHERE sku = $1").bind(sku).fetch_optional(conn).await
}

pub async fn set_active(
    id: i64,
    active: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<CatalogItem>, sqlx::Error> {
    sqlx::query_as("UPDATE catalog_items SET is_active = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
        .bind(active)
        .bind(id)
        .fetch_optional(conn)
        .await
}
