use log::*;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{Attributes, AttributesHash, Binding, NewBinding, PoolKind},
    helpers::{attributes_hash, normalize_attributes},
    traits::{BindingCandidate, InventoryError},
};

/// A binding row joined with its pool's current supply.
#[derive(Debug, FromRow)]
struct CandidateRow {
    id: i64,
    catalog_item_id: i64,
    pool_kind: PoolKind,
    pool_id: i64,
    attributes: Attributes,
    attributes_hash: AttributesHash,
    is_random: bool,
    priority: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    available: i64,
    pool_active: bool,
}

impl From<CandidateRow> for BindingCandidate {
    fn from(row: CandidateRow) -> Self {
        let binding = Binding {
            id: row.id,
            catalog_item_id: row.catalog_item_id,
            pool_kind: row.pool_kind,
            pool_id: row.pool_id,
            attributes: row.attributes,
            attributes_hash: row.attributes_hash,
            is_random: row.is_random,
            priority: row.priority,
            created_at: row.created_at,
        };
        Self { binding, available: row.available, pool_active: row.pool_active }
    }
}

/// Inserts a binding. The attributes are normalized and hashed here, so callers need not do it.
pub async fn insert_binding(binding: NewBinding, conn: &mut SqliteConnection) -> Result<Binding, InventoryError> {
    let attributes = normalize_attributes(&binding.attributes);
    let hash = attributes_hash(&attributes);
    let result = sqlx::query_as(
        r#"
            INSERT INTO bindings (catalog_item_id, pool_kind, pool_id, attributes, attributes_hash, is_random, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(binding.catalog_item_id)
    .bind(binding.pool_kind)
    .bind(binding.pool_id)
    .bind(attributes)
    .bind(hash)
    .bind(binding.is_random)
    .bind(binding.priority.max(0))
    .fetch_one(conn)
    .await;
    match result {
        Ok(binding) => Ok(binding),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!("🗃️ Binding for catalog item {} already exists for this combination", binding.catalog_item_id);
            Err(InventoryError::DuplicateBinding)
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_binding(id: i64, conn: &mut SqliteConnection) -> Result<Option<Binding>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM bindings WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_bindings_for_item(
    catalog_item_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Binding>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM bindings WHERE catalog_item_id = $1 ORDER BY id")
        .bind(catalog_item_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_binding_by_hash(
    catalog_item_id: i64,
    hash: &AttributesHash,
    conn: &mut SqliteConnection,
) -> Result<Option<Binding>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM bindings WHERE catalog_item_id = $1 AND attributes_hash = $2")
        .bind(catalog_item_id)
        .bind(hash.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn update_binding(
    id: i64,
    is_random: bool,
    priority: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Binding>, sqlx::Error> {
    sqlx::query_as("UPDATE bindings SET is_random = $1, priority = $2 WHERE id = $3 RETURNING *")
        .bind(is_random)
        .bind(priority.max(0))
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn delete_binding(id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM bindings WHERE id = $1").bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// All the bindings of the given kind for a catalog item, with a snapshot of how much each pool can supply.
pub async fn fetch_candidates(
    catalog_item_id: i64,
    kind: PoolKind,
    conn: &mut SqliteConnection,
) -> Result<Vec<BindingCandidate>, sqlx::Error> {
    let sql = match kind {
        PoolKind::Physical => {
            r#"
            SELECT b.*,
                   MAX(0, p.available_quantity - p.sold_quantity - p.reserved_quantity) AS available,
                   p.is_active AS pool_active
            FROM bindings b JOIN stock_pools p ON p.id = b.pool_id
            WHERE b.catalog_item_id = $1 AND b.pool_kind = 'physical'
            ORDER BY b.id
            "#
        },
        PoolKind::Virtual => {
            r#"
            SELECT b.*,
                   (SELECT COUNT(*) FROM virtual_stock_items v
                    WHERE v.pool_id = b.pool_id AND v.status = 'available') AS available,
                   vp.is_active AS pool_active
            FROM bindings b JOIN virtual_pools vp ON vp.id = b.pool_id
            WHERE b.catalog_item_id = $1 AND b.pool_kind = 'virtual'
            ORDER BY b.id
            "#
        },
    };
    let rows: Vec<CandidateRow> = sqlx::query_as(sql).bind(catalog_item_id).fetch_all(conn).await?;
    trace!("🗃️ {} {kind} binding candidates for catalog item {catalog_item_id}", rows.len());
    Ok(rows.into_iter().map(BindingCandidate::from).collect())
}

/// The distinct virtual pools bound to the catalog item.
///
/// If a binding exists for exactly `attributes`, only its pool is returned. Otherwise every virtual pool bound to the
/// item is.
pub async fn virtual_pools_for_item(
    catalog_item_id: i64,
    attributes: &Attributes,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, sqlx::Error> {
    let hash = attributes_hash(&normalize_attributes(attributes));
    let exact: Option<i64> = sqlx::query_scalar(
        "SELECT pool_id FROM bindings WHERE catalog_item_id = $1 AND pool_kind = 'virtual' AND attributes_hash = $2",
    )
    .bind(catalog_item_id)
    .bind(hash.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(pool_id) = exact {
        return Ok(vec![pool_id]);
    }
    sqlx::query_scalar(
        "SELECT DISTINCT pool_id FROM bindings WHERE catalog_item_id = $1 AND pool_kind = 'virtual' ORDER BY pool_id",
    )
    .bind(catalog_item_id)
    .fetch_all(conn)
    .await
}
