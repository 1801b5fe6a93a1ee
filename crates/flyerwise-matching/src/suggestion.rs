use flyerwise_core::FlyerOffer;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which search pass produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPass {
    /// Brand + name, store-scoped.
    Strong,
    /// Name only, penalized.
    Loose,
}

/// Itemized score: raw similarity plus each additive bonus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub similarity: f64,
    pub same_brand: f64,
    pub original_store: f64,
    pub preferred_store: f64,
    pub size_match: f64,
    pub cheaper: f64,
}

impl ScoreBreakdown {
    /// Sum in a fixed order so equal inputs always produce bit-identical totals.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.similarity
            + self.same_brand
            + self.original_store
            + self.preferred_store
            + self.size_match
            + self.cheaper
    }
}

/// A ranked replacement candidate for one list item within one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSuggestion {
    pub offer: FlyerOffer,
    pub pass: SearchPass,
    /// Similarity after any loose-pass penalty.
    pub raw_score: f64,
    pub score: f64,
    /// 1-based position in the shown list; 0 until ranked.
    pub rank: u32,
    pub same_brand: bool,
    pub original_store: bool,
    /// Candidate price minus the original offer price.
    pub price_delta: Option<Decimal>,
    pub breakdown: ScoreBreakdown,
    pub explanation: String,
    /// Shown despite being outside the session's selected stores (the
    /// mandatory same-brand alternative).
    pub out_of_selection: bool,
}

impl CandidateSuggestion {
    /// Unranked candidate straight out of a search pass.
    #[must_use]
    pub fn unranked(offer: FlyerOffer, pass: SearchPass, raw_score: f64, same_brand: bool) -> Self {
        Self {
            offer,
            pass,
            raw_score,
            score: raw_score,
            rank: 0,
            same_brand,
            original_store: false,
            price_delta: None,
            breakdown: ScoreBreakdown {
                similarity: raw_score,
                ..ScoreBreakdown::default()
            },
            explanation: String::new(),
            out_of_selection: false,
        }
    }

    #[must_use]
    pub fn offer_id(&self) -> Uuid {
        self.offer.id
    }

    #[must_use]
    pub fn store_id(&self) -> &str {
        &self.offer.store_id
    }
}
