//! Catalog and shopping-list domain types.
//!
//! The matching core treats [`CanonicalProduct`] and [`FlyerOffer`] as
//! read-only reference data; only [`ListItem`] belongs to the user.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::normalize_text;
use crate::package::PackageSize;

/// A deduplicated catalog entry ("product master").
///
/// `name` and `brand` are always stored in normalized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub package: Option<PackageSize>,
}

impl CanonicalProduct {
    /// Builds a product master, normalizing name and brand. A brand that
    /// normalizes to the empty string is treated as absent.
    #[must_use]
    pub fn new(
        id: Uuid,
        name: &str,
        brand: Option<&str>,
        category: Option<&str>,
        package: Option<PackageSize>,
    ) -> Self {
        Self {
            id,
            name: normalize_text(name),
            brand: brand.map(normalize_text).filter(|b| !b.is_empty()),
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(ToOwned::to_owned),
            package,
        }
    }

    /// Brand and name joined for the strong search pass, or `None` when the
    /// product has no brand.
    #[must_use]
    pub fn branded_query(&self) -> Option<String> {
        self.brand
            .as_deref()
            .map(|brand| format!("{brand} {}", self.name))
    }
}

/// A store-specific, time-bounded appearance of a product in a flyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlyerOffer {
    pub id: Uuid,
    pub canonical_product_id: Option<Uuid>,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub store_id: String,
    pub price: Decimal,
    pub package: Option<PackageSize>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl FlyerOffer {
    /// Returns `true` while `now` falls inside `[valid_from, valid_until)`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now < self.valid_until
    }

    /// Case- and accent-insensitive brand comparison.
    #[must_use]
    pub fn brand_matches(&self, brand: Option<&str>) -> bool {
        match (self.brand.as_deref(), brand) {
            (Some(ours), Some(theirs)) => {
                let ours = normalize_text(ours);
                !ours.is_empty() && ours == normalize_text(theirs)
            }
            _ => false,
        }
    }
}

/// What the item looked like when it was last linked to an offer. Kept so
/// the ranking engine can compare store, price and size after the offer
/// itself has expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferOrigin {
    pub offer_id: Uuid,
    pub store_id: String,
    pub price: Decimal,
    pub package: Option<PackageSize>,
}

/// A user's shopping-list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: Uuid,
    pub list_id: Uuid,
    /// Free text as typed or as copied from the flyer.
    pub text: String,
    /// Live link to a flyer offer; `None` once the offer has expired and
    /// been unlinked.
    pub offer_id: Option<Uuid>,
    pub product: Option<CanonicalProduct>,
    pub origin: Option<OfferOrigin>,
}

/// How an item participates in a migration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationEligibility {
    /// No live offer but a product master link: re-match algorithmically.
    Eligible,
    /// Neither link: free text, never auto-migrated.
    FreeText,
    /// Still linked to a live offer; nothing to migrate.
    HasLiveOffer,
}

impl ListItem {
    #[must_use]
    pub fn migration_eligibility(&self) -> MigrationEligibility {
        match (&self.offer_id, &self.product) {
            (None, Some(_)) => MigrationEligibility::Eligible,
            (None, None) => MigrationEligibility::FreeText,
            (Some(_), _) => MigrationEligibility::HasLiveOffer,
        }
    }

    /// Store the item was originally bought from, if known.
    #[must_use]
    pub fn original_store(&self) -> Option<&str> {
        self.origin.as_ref().map(|o| o.store_id.as_str())
    }

    #[must_use]
    pub fn original_price(&self) -> Option<Decimal> {
        self.origin.as_ref().map(|o| o.price)
    }

    /// Package size of the original offer, falling back to the product
    /// master's standard size.
    #[must_use]
    pub fn original_package(&self) -> Option<PackageSize> {
        self.origin
            .as_ref()
            .and_then(|o| o.package)
            .or_else(|| self.product.as_ref().and_then(|p| p.package))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::package::SizeUnit;

    fn product(brand: Option<&str>) -> CanonicalProduct {
        CanonicalProduct::new(Uuid::new_v4(), "Whole Milk", brand, Some("dairy"), None)
    }

    fn item(offer_id: Option<Uuid>, product: Option<CanonicalProduct>) -> ListItem {
        ListItem {
            id: Uuid::new_v4(),
            list_id: Uuid::new_v4(),
            text: "milk".to_string(),
            offer_id,
            product,
            origin: None,
        }
    }

    #[test]
    fn canonical_product_normalizes_name_and_brand() {
        let p = CanonicalProduct::new(Uuid::new_v4(), "  Crème FRAÎCHE ", Some("Élan"), None, None);
        assert_eq!(p.name, "creme fraiche");
        assert_eq!(p.brand.as_deref(), Some("elan"));
    }

    #[test]
    fn blank_brand_is_absent() {
        let p = product(Some("  - "));
        assert!(p.brand.is_none());
        assert!(p.branded_query().is_none());
    }

    #[test]
    fn branded_query_joins_brand_and_name() {
        let p = product(Some("Brand A"));
        assert_eq!(p.branded_query().as_deref(), Some("brand a whole milk"));
    }

    #[test]
    fn eligibility_follows_links() {
        assert_eq!(
            item(None, Some(product(None))).migration_eligibility(),
            MigrationEligibility::Eligible
        );
        assert_eq!(
            item(None, None).migration_eligibility(),
            MigrationEligibility::FreeText
        );
        assert_eq!(
            item(Some(Uuid::new_v4()), Some(product(None))).migration_eligibility(),
            MigrationEligibility::HasLiveOffer
        );
    }

    #[test]
    fn original_package_falls_back_to_product() {
        let mut p = product(None);
        p.package = Some(PackageSize::new(1000.0, SizeUnit::Millilitre));
        let i = item(None, Some(p));
        assert_eq!(
            i.original_package(),
            Some(PackageSize::new(1000.0, SizeUnit::Millilitre))
        );
    }

    #[test]
    fn offer_validity_window_is_half_open() {
        let now = Utc::now();
        let offer = FlyerOffer {
            id: Uuid::new_v4(),
            canonical_product_id: None,
            name: "milk".to_string(),
            brand: Some("Brand A".to_string()),
            category: None,
            store_id: "store-x".to_string(),
            price: Decimal::new(150, 2),
            package: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
        };
        assert!(offer.is_valid_at(now));
        assert!(!offer.is_valid_at(offer.valid_until));
        assert!(!offer.is_valid_at(now - Duration::days(2)));
    }

    #[test]
    fn brand_matches_ignores_case_and_accents() {
        let now = Utc::now();
        let offer = FlyerOffer {
            id: Uuid::new_v4(),
            canonical_product_id: None,
            name: "milk".to_string(),
            brand: Some("BRAND É".to_string()),
            category: None,
            store_id: "store-x".to_string(),
            price: Decimal::ONE,
            package: None,
            valid_from: now,
            valid_until: now,
        };
        assert!(offer.brand_matches(Some("brand e")));
        assert!(!offer.brand_matches(Some("other")));
        assert!(!offer.brand_matches(None));
    }
}
