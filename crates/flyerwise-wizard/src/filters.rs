use flyerwise_matching::{CandidateSuggestion, FinderFilters};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How much more expensive a replacement may be than the original offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum PriceStrategy {
    #[default]
    Any,
    NoIncrease,
    MaxIncreasePercent(u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrandStrategy {
    #[default]
    Any,
    SameBrandOnly,
}

/// Session-wide filter configuration chosen when the wizard starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFilters {
    /// Stores that earn the preferred-store bonus.
    pub preferred_stores: Vec<String>,
    /// Stores searched when an item's original store is unknown. Empty
    /// means every store.
    pub store_ids: Vec<String>,
    /// Requested store cap; clamped to `[1, 2]` when stores are selected.
    pub max_stores: i64,
    pub price_strategy: PriceStrategy,
    pub brand_strategy: BrandStrategy,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl Default for SessionFilters {
    fn default() -> Self {
        Self {
            preferred_stores: Vec::new(),
            store_ids: Vec::new(),
            max_stores: 2,
            price_strategy: PriceStrategy::Any,
            brand_strategy: BrandStrategy::Any,
            min_price: None,
            max_price: None,
        }
    }
}

impl SessionFilters {
    #[must_use]
    pub fn finder_filters(&self) -> FinderFilters {
        FinderFilters {
            store_ids: self.store_ids.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }

    /// Whether a ranked candidate passes the price and brand strategies.
    /// Candidates without a known original price always pass the price check.
    #[must_use]
    pub fn admits(&self, candidate: &CandidateSuggestion, original_price: Option<Decimal>) -> bool {
        if self.brand_strategy == BrandStrategy::SameBrandOnly && !candidate.same_brand {
            return false;
        }
        let Some(original) = original_price else {
            return true;
        };
        let delta = candidate.offer.price - original;
        match self.price_strategy {
            PriceStrategy::Any => true,
            PriceStrategy::NoIncrease => delta <= Decimal::ZERO,
            PriceStrategy::MaxIncreasePercent(percent) => {
                delta <= original * Decimal::from(percent) / Decimal::ONE_HUNDRED
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use flyerwise_core::FlyerOffer;
    use flyerwise_matching::SearchPass;
    use uuid::Uuid;

    use super::*;

    fn candidate(cents: i64, same_brand: bool) -> CandidateSuggestion {
        let now = Utc::now();
        CandidateSuggestion::unranked(
            FlyerOffer {
                id: Uuid::new_v4(),
                canonical_product_id: None,
                name: "whole milk".into(),
                brand: None,
                category: None,
                store_id: "store-x".into(),
                price: Decimal::new(cents, 2),
                package: None,
                valid_from: now,
                valid_until: now + Duration::days(7),
            },
            SearchPass::Strong,
            0.9,
            same_brand,
        )
    }

    #[test]
    fn price_strategies() {
        let original = Some(Decimal::new(200, 2));
        let mut filters = SessionFilters {
            price_strategy: PriceStrategy::NoIncrease,
            ..SessionFilters::default()
        };
        assert!(filters.admits(&candidate(200, false), original));
        assert!(!filters.admits(&candidate(201, false), original));
        assert!(filters.admits(&candidate(999, false), None));

        filters.price_strategy = PriceStrategy::MaxIncreasePercent(10);
        assert!(filters.admits(&candidate(220, false), original));
        assert!(!filters.admits(&candidate(221, false), original));
    }

    #[test]
    fn same_brand_only() {
        let filters = SessionFilters {
            brand_strategy: BrandStrategy::SameBrandOnly,
            ..SessionFilters::default()
        };
        assert!(filters.admits(&candidate(100, true), None));
        assert!(!filters.admits(&candidate(100, false), None));
    }

    #[test]
    fn filters_deserialize_with_defaults() {
        let filters: SessionFilters = serde_json::from_str(
            r#"{"max_stores": 1, "price_strategy": {"kind": "max_increase_percent", "percent": 15}}"#,
        )
        .unwrap();
        assert_eq!(filters.max_stores, 1);
        assert_eq!(filters.price_strategy, PriceStrategy::MaxIncreasePercent(15));
        assert_eq!(filters.brand_strategy, BrandStrategy::Any);
        assert!(filters.preferred_stores.is_empty());
    }
}
