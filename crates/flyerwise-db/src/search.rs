//! `pg_trgm` implementation of [`SimilaritySearch`] over `flyer_offers`.
//!
//! Scores come from `similarity(search_text, query)`. Strict mode further
//! requires every query token to appear as a whole word of `search_text`.

use async_trait::async_trait;
use flyerwise_matching::{SearchError, SearchHit, SearchMode, SearchQuery, SimilaritySearch};
use sqlx::PgPool;

use crate::catalog::{FlyerOfferRow, OFFER_COLUMNS};

#[derive(Debug, sqlx::FromRow)]
struct ScoredOfferRow {
    #[sqlx(flatten)]
    offer: FlyerOfferRow,
    raw_score: f64,
}

#[derive(Debug, Clone)]
pub struct PgSimilaritySearch {
    pool: PgPool,
}

impl PgSimilaritySearch {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn search_sql() -> String {
    format!(
        "SELECT {OFFER_COLUMNS}, similarity(search_text, $1)::float8 AS raw_score \
         FROM flyer_offers \
         WHERE valid_from <= NOW() AND valid_until > NOW() \
           AND similarity(search_text, $1) > 0 \
           AND (cardinality($2::text[]) = 0 OR store_id = ANY($2)) \
           AND ($3::text IS NULL OR category IS NULL OR lower(category) = lower($3)) \
           AND ($4::numeric IS NULL OR price >= $4) \
           AND ($5::numeric IS NULL OR price <= $5) \
           AND (NOT $6 OR NOT EXISTS ( \
                 SELECT 1 FROM unnest(string_to_array($1, ' ')) AS q(token) \
                 WHERE q.token <> '' \
                   AND NOT (q.token = ANY(string_to_array(search_text, ' '))))) \
         ORDER BY raw_score DESC, id ASC \
         LIMIT $7"
    )
}

#[async_trait]
impl SimilaritySearch for PgSimilaritySearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, ScoredOfferRow>(&search_sql())
            .bind(&query.text)
            .bind(&query.filters.store_ids)
            .bind(&query.filters.category)
            .bind(query.filters.min_price)
            .bind(query.filters.max_price)
            .bind(query.mode == SearchMode::Strict)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::warn!(mode = %query.mode, error = %e, "trigram search failed");
                SearchError::Unavailable(e.to_string())
            })?;

        rows.into_iter()
            .map(|row| {
                let offer = row
                    .offer
                    .into_offer()
                    .map_err(|e| SearchError::Unavailable(e.to_string()))?;
                Ok(SearchHit {
                    offer,
                    raw_score: row.raw_score,
                })
            })
            .collect()
    }
}
