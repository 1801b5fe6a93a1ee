//! Product matching and ranking for flyer-offer migration.
//!
//! Candidate retrieval runs through the [`SimilaritySearch`] capability in
//! two passes ([`finder`]), candidates are scored with a fixed additive
//! weight table ([`ranking`]), and a greedy heuristic caps how many stores
//! a migration plan may span ([`stores`]). Everything here is read-only
//! with respect to the catalog.

pub mod finder;
pub mod memory;
pub mod ranking;
pub mod search;
pub mod stores;
pub mod suggestion;

#[cfg(test)]
mod testing;

pub use finder::{CandidateFinder, FinderError, FinderFilters};
pub use memory::InMemorySearch;
pub use ranking::{rank_candidates, score_candidate, select_top_k, RankingContext};
pub use search::{SearchError, SearchFilters, SearchHit, SearchMode, SearchQuery, SimilaritySearch};
pub use stores::{apply_store_selection, clamp_max_stores, select_stores, SecondStore, StoreSelection};
pub use suggestion::{CandidateSuggestion, ScoreBreakdown, SearchPass};
