//! Two-pass candidate retrieval for a single list item.
//!
//! 1. **Strong pass** (only when the product master has a brand): query
//!    `brand + name` in strict mode, scoped to the item's original store
//!    when known, otherwise to the caller's stores.
//! 2. **Loose pass** (only when the strong pass returned fewer than
//!    `min_strong_candidates` hits): query the name alone across the
//!    caller's stores. Scores are multiplied by `loose_pass_penalty` and
//!    hits already returned by the strong pass are dropped.
//!
//! The finder never mutates anything; an empty result is a valid outcome.

use std::collections::HashSet;
use std::sync::Arc;

use flyerwise_core::{normalize_text, CanonicalProduct, ListItem, ScoringConfig};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::search::{SearchError, SearchFilters, SearchHit, SearchMode, SearchQuery, SimilaritySearch};
use crate::suggestion::{CandidateSuggestion, SearchPass};

#[derive(Debug, Error)]
pub enum FinderError {
    /// The item has no product master link; it can only be re-matched by a
    /// manual search.
    #[error("item {item_id} has no product master; manual search required")]
    NoProductMaster { item_id: Uuid },

    #[error(transparent)]
    SearchUnavailable(#[from] SearchError),
}

/// Caller-supplied scope for both passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinderFilters {
    /// Stores to search when the item's original store is unknown, and for
    /// the loose pass. Empty means all stores.
    pub store_ids: Vec<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

pub struct CandidateFinder {
    search: Arc<dyn SimilaritySearch>,
    scoring: Arc<ScoringConfig>,
}

impl CandidateFinder {
    #[must_use]
    pub fn new(search: Arc<dyn SimilaritySearch>, scoring: Arc<ScoringConfig>) -> Self {
        Self { search, scoring }
    }

    /// Collects unranked replacement candidates for `item`.
    ///
    /// # Errors
    ///
    /// - [`FinderError::NoProductMaster`] if the item carries no product link.
    /// - [`FinderError::SearchUnavailable`] if either search pass fails.
    pub async fn find_candidates(
        &self,
        item: &ListItem,
        filters: &FinderFilters,
    ) -> Result<Vec<CandidateSuggestion>, FinderError> {
        let product = item
            .product
            .as_ref()
            .ok_or(FinderError::NoProductMaster { item_id: item.id })?;

        let excluded: HashSet<Uuid> = item
            .offer_id
            .into_iter()
            .chain(item.origin.as_ref().map(|o| o.offer_id))
            .collect();

        let mut candidates = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();

        if let Some(branded) = product.branded_query() {
            let store_ids = match item.original_store() {
                Some(store) => vec![store.to_string()],
                None => filters.store_ids.clone(),
            };
            let hits = self
                .run_pass(branded, SearchMode::Strict, store_ids, product, filters)
                .await?;
            for hit in hits {
                self.accept(hit, SearchPass::Strong, 1.0, product, &excluded, &mut seen, &mut candidates);
            }
        }

        let strong_count = candidates.len();
        if strong_count < self.scoring.min_strong_candidates {
            let hits = self
                .run_pass(
                    normalize_text(&product.name),
                    SearchMode::Loose,
                    filters.store_ids.clone(),
                    product,
                    filters,
                )
                .await?;
            let penalty = self.scoring.loose_pass_penalty;
            for hit in hits {
                self.accept(hit, SearchPass::Loose, penalty, product, &excluded, &mut seen, &mut candidates);
            }
        }

        tracing::debug!(
            item_id = %item.id,
            strong = strong_count,
            loose = candidates.len() - strong_count,
            "candidate search complete"
        );

        Ok(candidates)
    }

    async fn run_pass(
        &self,
        text: String,
        mode: SearchMode,
        store_ids: Vec<String>,
        product: &CanonicalProduct,
        filters: &FinderFilters,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let query = SearchQuery {
            text,
            mode,
            filters: SearchFilters {
                store_ids,
                category: product.category.clone(),
                min_price: filters.min_price,
                max_price: filters.max_price,
            },
            limit: self.scoring.pass_limit,
        };
        self.search.search(&query).await.inspect_err(|e| {
            tracing::warn!(mode = %mode, error = %e, "similarity search failed");
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn accept(
        &self,
        hit: SearchHit,
        pass: SearchPass,
        multiplier: f64,
        product: &CanonicalProduct,
        excluded: &HashSet<Uuid>,
        seen: &mut HashSet<Uuid>,
        out: &mut Vec<CandidateSuggestion>,
    ) {
        if excluded.contains(&hit.offer.id) {
            return;
        }
        let score = hit.raw_score * multiplier;
        if score < self.scoring.min_similarity {
            return;
        }
        if !seen.insert(hit.offer.id) {
            return;
        }
        let same_brand = hit.offer.brand_matches(product.brand.as_deref());
        out.push(CandidateSuggestion::unranked(hit.offer, pass, score, same_brand));
    }
}
