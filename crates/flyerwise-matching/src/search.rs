//! Contract for the external full-text/trigram search capability.
//!
//! The index itself lives outside this workspace (Postgres `pg_trgm` in
//! production, [`crate::InMemorySearch`] in tests). Scores are only
//! comparable within a single call.

use async_trait::async_trait;
use flyerwise_core::FlyerOffer;
use rust_decimal::Decimal;
use thiserror::Error;

/// How strictly the query text must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Every query token must be present in the candidate.
    Strict,
    /// Any sufficiently similar candidate qualifies.
    Loose,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Strict => write!(f, "strict"),
            SearchMode::Loose => write!(f, "loose"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Restrict to these stores; empty means all stores.
    pub store_ids: Vec<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Normalized query text.
    pub text: String,
    pub mode: SearchMode,
    pub filters: SearchFilters,
    pub limit: usize,
}

/// One scored offer returned by the search backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub offer: FlyerOffer,
    /// Backend similarity in `[0, 1]`.
    pub raw_score: f64,
}

#[derive(Debug, Error)]
pub enum SearchError {
    /// Backend unreachable or failed; callers may retry with backoff.
    #[error("similarity search unavailable: {0}")]
    Unavailable(String),
}

/// Scored retrieval of currently valid flyer offers.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Returns up to `query.limit` hits ordered by descending score.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SearchError>;
}
