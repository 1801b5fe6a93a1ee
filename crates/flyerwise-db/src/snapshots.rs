//! Database operations for the append-only `offer_snapshots` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flyerwise_wizard::{OfferSnapshot, SnapshotStore, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `offer_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: Uuid,
    pub item_id: Uuid,
    pub session_id: Uuid,
    pub offer_id: Uuid,
    pub canonical_product_id: Option<Uuid>,
    pub store_id: String,
    pub price: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub rank: i32,
    pub score: f64,
    pub explanation: String,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

impl From<SnapshotRow> for OfferSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            item_id: row.item_id,
            session_id: row.session_id,
            offer_id: row.offer_id,
            canonical_product_id: row.canonical_product_id,
            store_id: row.store_id,
            price: row.price,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            rank: row.rank,
            score: row.score,
            explanation: row.explanation,
            selected: row.selected,
            created_at: row.created_at,
        }
    }
}

/// Inserts a snapshot unless one already exists for
/// `(item_id, session_id, offer_id, store_id)`.
///
/// Returns `true` if a row was written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_snapshot_if_absent(
    pool: &PgPool,
    snapshot: &OfferSnapshot,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO offer_snapshots \
             (id, item_id, session_id, offer_id, canonical_product_id, store_id, price, \
              valid_from, valid_until, rank, score, explanation, selected, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         ON CONFLICT (item_id, session_id, offer_id, store_id) DO NOTHING",
    )
    .bind(snapshot.id)
    .bind(snapshot.item_id)
    .bind(snapshot.session_id)
    .bind(snapshot.offer_id)
    .bind(snapshot.canonical_product_id)
    .bind(&snapshot.store_id)
    .bind(snapshot.price)
    .bind(snapshot.valid_from)
    .bind(snapshot.valid_until)
    .bind(snapshot.rank)
    .bind(snapshot.score)
    .bind(&snapshot.explanation)
    .bind(snapshot.selected)
    .bind(snapshot.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Snapshots of one session ordered by item, then rank.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_snapshots_for_session(
    pool: &PgPool,
    session_id: Uuid,
) -> Result<Vec<SnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        "SELECT id, item_id, session_id, offer_id, canonical_product_id, store_id, price, \
                valid_from, valid_until, rank, score, explanation, selected, created_at \
         FROM offer_snapshots \
         WHERE session_id = $1 \
         ORDER BY item_id, rank",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn insert_if_absent(&self, snapshot: &OfferSnapshot) -> Result<bool, StoreError> {
        Ok(insert_snapshot_if_absent(&self.pool, snapshot).await?)
    }

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<OfferSnapshot>, StoreError> {
        let rows = list_snapshots_for_session(&self.pool, session_id).await?;
        Ok(rows.into_iter().map(OfferSnapshot::from).collect())
    }
}
