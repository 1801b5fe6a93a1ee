//! In-process [`SimilaritySearch`] for tests and local development.
//!
//! Scores with the Sørensen–Dice bigram coefficient from `strsim`, the
//! closest in-memory analogue of trigram similarity. Offers outside their
//! validity window are never returned.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use flyerwise_core::normalize::tokens;
use flyerwise_core::{normalize_text, FlyerOffer};
use uuid::Uuid;

use crate::search::{SearchError, SearchHit, SearchMode, SearchQuery, SimilaritySearch};

pub struct InMemorySearch {
    offers: RwLock<Vec<FlyerOffer>>,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl InMemorySearch {
    #[must_use]
    pub fn new(offers: Vec<FlyerOffer>) -> Self {
        Self {
            offers: RwLock::new(offers),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, offer: FlyerOffer) {
        if let Ok(mut offers) = self.offers.write() {
            offers.retain(|o| o.id != offer.id);
            offers.push(offer);
        }
    }

    pub fn remove(&self, offer_id: Uuid) {
        if let Ok(mut offers) = self.offers.write() {
            offers.retain(|o| o.id != offer_id);
        }
    }

    /// Simulates a backend outage when set to `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `search` calls served so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemorySearch {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn offer_text(offer: &FlyerOffer) -> String {
    match offer.brand.as_deref() {
        Some(brand) => normalize_text(&format!("{brand} {}", offer.name)),
        None => normalize_text(&offer.name),
    }
}

fn passes_filters(offer: &FlyerOffer, query: &SearchQuery) -> bool {
    let filters = &query.filters;
    if !filters.store_ids.is_empty() && !filters.store_ids.iter().any(|s| *s == offer.store_id) {
        return false;
    }
    if let (Some(wanted), Some(actual)) = (filters.category.as_deref(), offer.category.as_deref()) {
        if !wanted.eq_ignore_ascii_case(actual) {
            return false;
        }
    }
    if filters.min_price.is_some_and(|min| offer.price < min) {
        return false;
    }
    if filters.max_price.is_some_and(|max| offer.price > max) {
        return false;
    }
    true
}

#[async_trait]
impl SimilaritySearch for InMemorySearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(SearchError::Unavailable(
                "in-memory index marked unavailable".to_string(),
            ));
        }

        let offers = self
            .offers
            .read()
            .map_err(|_| SearchError::Unavailable("in-memory index poisoned".to_string()))?;

        let now = Utc::now();
        let query_text = normalize_text(&query.text);
        let query_tokens = tokens(&query_text);

        let mut hits: Vec<SearchHit> = offers
            .iter()
            .filter(|offer| offer.is_valid_at(now) && passes_filters(offer, query))
            .filter_map(|offer| {
                let text = offer_text(offer);
                if query.mode == SearchMode::Strict {
                    let candidate_tokens = tokens(&text);
                    if !query_tokens.iter().all(|t| candidate_tokens.contains(t)) {
                        return None;
                    }
                }
                let raw_score = strsim::sorensen_dice(&query_text, &text);
                (raw_score > 0.0).then(|| SearchHit {
                    offer: offer.clone(),
                    raw_score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.raw_score
                .total_cmp(&a.raw_score)
                .then_with(|| a.offer.id.cmp(&b.offer.id))
        });
        hits.truncate(query.limit);
        Ok(hits)
    }
}
