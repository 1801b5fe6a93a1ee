//! Database operations for `shopping_list_items` and
//! `list_migration_batches`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flyerwise_core::{CanonicalProduct, ListItem, OfferOrigin};
use flyerwise_wizard::{BatchReceipt, ListOperation, ShoppingListStore, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::catalog::{package_from_columns, package_to_columns};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A `shopping_list_items` row joined with its product master.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListItemRow {
    pub id: Uuid,
    pub list_id: Uuid,
    pub text: String,
    pub position: i32,
    pub offer_id: Option<Uuid>,
    pub canonical_product_id: Option<Uuid>,
    pub origin_offer_id: Option<Uuid>,
    pub origin_store_id: Option<String>,
    pub origin_price: Option<Decimal>,
    pub origin_package_value: Option<f64>,
    pub origin_package_unit: Option<String>,
    /// `NULL` when the item has no product master.
    pub product_name: Option<String>,
    pub product_brand: Option<String>,
    pub product_category: Option<String>,
    pub product_package_value: Option<f64>,
    pub product_package_unit: Option<String>,
}

impl ListItemRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if a stored package unit is unknown.
    pub fn into_item(self) -> Result<ListItem, DbError> {
        let product = match (self.canonical_product_id, self.product_name) {
            (Some(id), Some(name)) => Some(CanonicalProduct {
                id,
                name,
                brand: self.product_brand,
                category: self.product_category,
                package: package_from_columns(
                    self.product_package_value,
                    self.product_package_unit.as_deref(),
                )?,
            }),
            _ => None,
        };
        let origin = match (self.origin_offer_id, self.origin_store_id, self.origin_price) {
            (Some(offer_id), Some(store_id), Some(price)) => Some(OfferOrigin {
                offer_id,
                store_id,
                price,
                package: package_from_columns(
                    self.origin_package_value,
                    self.origin_package_unit.as_deref(),
                )?,
            }),
            _ => None,
        };
        Ok(ListItem {
            id: self.id,
            list_id: self.list_id,
            text: self.text,
            offer_id: self.offer_id,
            product,
            origin,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct BatchRow {
    batch_id: Uuid,
    list_id: Uuid,
    applied: i32,
    applied_at: DateTime<Utc>,
}

impl BatchRow {
    fn into_receipt(self, replayed: bool) -> BatchReceipt {
        BatchReceipt {
            batch_id: self.batch_id,
            list_id: self.list_id,
            applied: usize::try_from(self.applied).unwrap_or(0),
            replayed,
            applied_at: self.applied_at,
        }
    }
}

// ---------------------------------------------------------------------------
// shopping_list_items operations
// ---------------------------------------------------------------------------

/// Items of one list in `position` order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidValue`] if a row holds an unknown package unit.
pub async fn list_items(pool: &PgPool, list_id: Uuid) -> Result<Vec<ListItem>, DbError> {
    let rows = sqlx::query_as::<_, ListItemRow>(
        "SELECT i.id, i.list_id, i.text, i.position, i.offer_id, i.canonical_product_id, \
                i.origin_offer_id, i.origin_store_id, i.origin_price, \
                i.origin_package_value, i.origin_package_unit, \
                p.name AS product_name, p.brand AS product_brand, \
                p.category AS product_category, \
                p.package_value AS product_package_value, \
                p.package_unit AS product_package_unit \
         FROM shopping_list_items i \
         LEFT JOIN canonical_products p ON p.id = i.canonical_product_id \
         WHERE i.list_id = $1 \
         ORDER BY i.position ASC, i.id ASC",
    )
    .bind(list_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(ListItemRow::into_item).collect()
}

/// Inserts one list item at `position`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_list_item(pool: &PgPool, item: &ListItem, position: i32) -> Result<(), DbError> {
    let origin = item.origin.as_ref();
    let (package_value, package_unit) =
        package_to_columns(origin.and_then(|o| o.package.as_ref()));
    sqlx::query(
        "INSERT INTO shopping_list_items \
             (id, list_id, text, position, offer_id, canonical_product_id, \
              origin_offer_id, origin_store_id, origin_price, \
              origin_package_value, origin_package_unit) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(item.id)
    .bind(item.list_id)
    .bind(&item.text)
    .bind(position)
    .bind(item.offer_id)
    .bind(item.product.as_ref().map(|p| p.id))
    .bind(origin.map(|o| o.offer_id))
    .bind(origin.map(|o| o.store_id.clone()))
    .bind(origin.map(|o| o.price))
    .bind(package_value)
    .bind(package_unit)
    .execute(pool)
    .await?;
    Ok(())
}

/// Applies `ops` to a list in one transaction.
///
/// A `batch_id` already present in `list_migration_batches` returns the
/// stored receipt with `replayed = true` and touches nothing. An operation
/// naming an item not on the list rolls the whole batch back.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if any item is missing from the list, or
/// [`DbError::Sqlx`] if a statement fails.
pub async fn apply_list_batch(
    pool: &PgPool,
    list_id: Uuid,
    batch_id: Uuid,
    ops: &[ListOperation],
) -> Result<BatchReceipt, DbError> {
    let applied = i32::try_from(ops.len())
        .map_err(|_| DbError::InvalidValue(format!("batch too large: {}", ops.len())))?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_as::<_, BatchRow>(
        "INSERT INTO list_migration_batches (batch_id, list_id, applied) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (batch_id) DO NOTHING \
         RETURNING batch_id, list_id, applied, applied_at",
    )
    .bind(batch_id)
    .bind(list_id)
    .bind(applied)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(batch) = inserted else {
        tx.rollback().await?;
        let previous = sqlx::query_as::<_, BatchRow>(
            "SELECT batch_id, list_id, applied, applied_at \
             FROM list_migration_batches WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_one(pool)
        .await?;
        tracing::info!(%batch_id, %list_id, "list batch already applied; replaying receipt");
        return Ok(previous.into_receipt(true));
    };

    for op in ops {
        let result = match op {
            ListOperation::Replace { item_id, origin } => {
                let (package_value, package_unit) = package_to_columns(origin.package.as_ref());
                sqlx::query(
                    "UPDATE shopping_list_items SET \
                         offer_id             = $3, \
                         origin_offer_id      = $3, \
                         origin_store_id      = $4, \
                         origin_price         = $5, \
                         origin_package_value = $6, \
                         origin_package_unit  = $7, \
                         updated_at           = NOW() \
                     WHERE id = $1 AND list_id = $2",
                )
                .bind(item_id)
                .bind(list_id)
                .bind(origin.offer_id)
                .bind(&origin.store_id)
                .bind(origin.price)
                .bind(package_value)
                .bind(package_unit)
                .execute(&mut *tx)
                .await?
            }
            ListOperation::Keep { item_id } => {
                sqlx::query(
                    "UPDATE shopping_list_items SET \
                         offer_id             = NULL, \
                         origin_offer_id      = NULL, \
                         origin_store_id      = NULL, \
                         origin_price         = NULL, \
                         origin_package_value = NULL, \
                         origin_package_unit  = NULL, \
                         updated_at           = NOW() \
                     WHERE id = $1 AND list_id = $2",
                )
                .bind(item_id)
                .bind(list_id)
                .execute(&mut *tx)
                .await?
            }
            ListOperation::Remove { item_id } => {
                sqlx::query("DELETE FROM shopping_list_items WHERE id = $1 AND list_id = $2")
                    .bind(item_id)
                    .bind(list_id)
                    .execute(&mut *tx)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            tracing::warn!(
                %batch_id,
                %list_id,
                item_id = %op.item_id(),
                "list item missing; rolling back batch"
            );
            tx.rollback().await?;
            return Err(DbError::NotFound);
        }
    }

    tx.commit().await?;
    tracing::info!(%batch_id, %list_id, applied, "list batch applied");
    Ok(batch.into_receipt(false))
}

// ---------------------------------------------------------------------------
// ShoppingListStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgShoppingListStore {
    pool: PgPool,
}

impl PgShoppingListStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShoppingListStore for PgShoppingListStore {
    async fn list_items(&self, list_id: Uuid) -> Result<Vec<ListItem>, StoreError> {
        Ok(list_items(&self.pool, list_id).await?)
    }

    async fn apply_batch(
        &self,
        list_id: Uuid,
        batch_id: Uuid,
        ops: &[ListOperation],
    ) -> Result<BatchReceipt, StoreError> {
        Ok(apply_list_batch(&self.pool, list_id, batch_id, ops).await?)
    }
}
