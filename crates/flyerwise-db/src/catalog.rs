//! Database operations for `canonical_products`, `flyer_offers` and the
//! `catalog_version` freshness marker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flyerwise_core::{normalize_text, CanonicalProduct, FlyerOffer, PackageSize, SizeUnit};
use flyerwise_wizard::{CatalogReader, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `canonical_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CanonicalProductRow {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub package_value: Option<f64>,
    /// `g`, `ml` or `pc`; set exactly when `package_value` is.
    pub package_unit: Option<String>,
}

impl CanonicalProductRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if the stored unit is unknown.
    pub fn into_product(self) -> Result<CanonicalProduct, DbError> {
        Ok(CanonicalProduct {
            id: self.id,
            name: self.name,
            brand: self.brand,
            category: self.category,
            package: package_from_columns(self.package_value, self.package_unit.as_deref())?,
        })
    }
}

/// A row from the `flyer_offers` table (without `search_text`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlyerOfferRow {
    pub id: Uuid,
    pub canonical_product_id: Option<Uuid>,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub store_id: String,
    pub price: Decimal,
    pub package_value: Option<f64>,
    pub package_unit: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl FlyerOfferRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if the stored unit is unknown.
    pub fn into_offer(self) -> Result<FlyerOffer, DbError> {
        Ok(FlyerOffer {
            id: self.id,
            canonical_product_id: self.canonical_product_id,
            name: self.name,
            brand: self.brand,
            category: self.category,
            store_id: self.store_id,
            price: self.price,
            package: package_from_columns(self.package_value, self.package_unit.as_deref())?,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
        })
    }
}

/// Column list matching [`FlyerOfferRow`].
pub(crate) const OFFER_COLUMNS: &str = "id, canonical_product_id, name, brand, category, \
     store_id, price, package_value, package_unit, valid_from, valid_until";

pub(crate) fn package_from_columns(
    value: Option<f64>,
    unit: Option<&str>,
) -> Result<Option<PackageSize>, DbError> {
    match (value, unit) {
        (Some(value), Some(unit)) => {
            let unit = unit.parse::<SizeUnit>().map_err(DbError::InvalidValue)?;
            Ok(Some(PackageSize::new(value, unit)))
        }
        _ => Ok(None),
    }
}

pub(crate) fn package_to_columns(package: Option<&PackageSize>) -> (Option<f64>, Option<String>) {
    match package {
        Some(p) => (Some(p.value), Some(p.unit.to_string())),
        None => (None, None),
    }
}

/// Text the trigram index runs against: normalized brand and name.
fn search_text(offer: &FlyerOffer) -> String {
    match offer.brand.as_deref() {
        Some(brand) => normalize_text(&format!("{brand} {}", offer.name)),
        None => normalize_text(&offer.name),
    }
}

// ---------------------------------------------------------------------------
// canonical_products operations
// ---------------------------------------------------------------------------

/// Upserts a product master by `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_canonical_product(
    pool: &PgPool,
    product: &CanonicalProduct,
) -> Result<(), DbError> {
    let (package_value, package_unit) = package_to_columns(product.package.as_ref());
    sqlx::query(
        "INSERT INTO canonical_products \
             (id, name, brand, category, package_value, package_unit) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET \
             name          = EXCLUDED.name, \
             brand         = EXCLUDED.brand, \
             category      = EXCLUDED.category, \
             package_value = EXCLUDED.package_value, \
             package_unit  = EXCLUDED.package_unit, \
             updated_at    = NOW()",
    )
    .bind(product.id)
    .bind(&product.name)
    .bind(&product.brand)
    .bind(&product.category)
    .bind(package_value)
    .bind(package_unit)
    .execute(pool)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidValue`] if the row holds an unknown package unit.
pub async fn get_canonical_product(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<CanonicalProduct>, DbError> {
    let row = sqlx::query_as::<_, CanonicalProductRow>(
        "SELECT id, name, brand, category, package_value, package_unit \
         FROM canonical_products WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(CanonicalProductRow::into_product).transpose()
}

// ---------------------------------------------------------------------------
// flyer_offers operations
// ---------------------------------------------------------------------------

/// Upserts a flyer offer by `id`. Every call moves the catalog version
/// forward through the `flyer_offers_bump_version` trigger.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_offer(pool: &PgPool, offer: &FlyerOffer) -> Result<(), DbError> {
    let (package_value, package_unit) = package_to_columns(offer.package.as_ref());
    sqlx::query(
        "INSERT INTO flyer_offers \
             (id, canonical_product_id, name, brand, category, store_id, price, \
              package_value, package_unit, valid_from, valid_until, search_text) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (id) DO UPDATE SET \
             canonical_product_id = EXCLUDED.canonical_product_id, \
             name                 = EXCLUDED.name, \
             brand                = EXCLUDED.brand, \
             category             = EXCLUDED.category, \
             store_id             = EXCLUDED.store_id, \
             price                = EXCLUDED.price, \
             package_value        = EXCLUDED.package_value, \
             package_unit         = EXCLUDED.package_unit, \
             valid_from           = EXCLUDED.valid_from, \
             valid_until          = EXCLUDED.valid_until, \
             search_text          = EXCLUDED.search_text, \
             updated_at           = NOW()",
    )
    .bind(offer.id)
    .bind(offer.canonical_product_id)
    .bind(&offer.name)
    .bind(&offer.brand)
    .bind(&offer.category)
    .bind(&offer.store_id)
    .bind(offer.price)
    .bind(package_value)
    .bind(package_unit)
    .bind(offer.valid_from)
    .bind(offer.valid_until)
    .bind(search_text(offer))
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetches the offers among `ids` that still exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidValue`] if a row holds an unknown package unit.
pub async fn get_offers_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<FlyerOffer>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, FlyerOfferRow>(&format!(
        "SELECT {OFFER_COLUMNS} FROM flyer_offers WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(FlyerOfferRow::into_offer).collect()
}

/// Reads the current catalog freshness marker.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn current_catalog_version(pool: &PgPool) -> Result<i64, DbError> {
    let version = sqlx::query_scalar::<_, i64>("SELECT version FROM catalog_version")
        .fetch_optional(pool)
        .await?;
    version.ok_or(DbError::NotFound)
}

// ---------------------------------------------------------------------------
// CatalogReader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgCatalogReader {
    pool: PgPool,
}

impl PgCatalogReader {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogReader for PgCatalogReader {
    async fn dataset_version(&self) -> Result<i64, StoreError> {
        Ok(current_catalog_version(&self.pool).await?)
    }

    async fn offers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<FlyerOffer>, StoreError> {
        Ok(get_offers_by_ids(&self.pool, ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_columns_round_trip() {
        let package = PackageSize::new(500.0, SizeUnit::Gram);
        let (value, unit) = package_to_columns(Some(&package));
        assert_eq!(unit.as_deref(), Some("g"));
        assert_eq!(
            package_from_columns(value, unit.as_deref()).unwrap(),
            Some(package)
        );
    }

    #[test]
    fn half_set_package_columns_read_as_absent() {
        assert_eq!(package_from_columns(Some(1.0), None).unwrap(), None);
        assert_eq!(package_from_columns(None, Some("g")).unwrap(), None);
    }

    #[test]
    fn unknown_unit_is_rejected() {
        let err = package_from_columns(Some(1.0), Some("oz")).unwrap_err();
        assert!(matches!(err, DbError::InvalidValue(msg) if msg.contains("oz")));
    }

    #[test]
    fn search_text_is_normalized_brand_and_name() {
        let now = Utc::now();
        let offer = FlyerOffer {
            id: Uuid::new_v4(),
            canonical_product_id: None,
            name: "Lait Entier".to_string(),
            brand: Some("Crème".to_string()),
            category: None,
            store_id: "store-x".to_string(),
            price: Decimal::ONE,
            package: None,
            valid_from: now,
            valid_until: now,
        };
        assert_eq!(search_text(&offer), "creme lait entier");
    }
}
