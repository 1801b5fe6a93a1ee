//! Deterministic, fixed-weight ranking of replacement candidates.
//!
//! `score = similarity + same_brand + original_store + preferred_store
//!          + size_match + cheaper`
//!
//! Every bonus is an additive constant from [`ScoringConfig`]. Ordering is
//! score descending, then price ascending, then offer id ascending, which
//! makes the result a pure function of its inputs regardless of input
//! order.
//!
//! [`select_top_k`] then applies the same-brand guarantee: if any candidate
//! shares the original brand, at least one such candidate is shown even if
//! its score alone would not place it in the top K.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;

use flyerwise_core::{ListItem, ScoringConfig};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::suggestion::{CandidateSuggestion, ScoreBreakdown, SearchPass};

/// Inputs to scoring that are not properties of the item or candidate.
#[derive(Debug, Clone, Copy)]
pub struct RankingContext<'a> {
    pub scoring: &'a ScoringConfig,
    /// Preferred stores; duplicates are harmless, the bonus applies once.
    pub preferred_stores: &'a [String],
}

/// Computes the itemized score of `candidate` as a replacement for `original`.
#[must_use]
pub fn score_candidate(
    original: &ListItem,
    candidate: &CandidateSuggestion,
    ctx: &RankingContext<'_>,
) -> ScoreBreakdown {
    let scoring = ctx.scoring;
    let offer = &candidate.offer;

    let bonus = |applies: bool, weight: f64| if applies { weight } else { 0.0 };

    let original_store = original
        .original_store()
        .is_some_and(|store| store == offer.store_id);
    let preferred = ctx.preferred_stores.iter().any(|s| *s == offer.store_id);
    let size_match = match (original.original_package(), offer.package) {
        (Some(a), Some(b)) => a.within_tolerance(&b, scoring.size_tolerance),
        _ => false,
    };
    let cheaper = original
        .original_price()
        .is_some_and(|price| offer.price < price);

    ScoreBreakdown {
        similarity: candidate.raw_score,
        same_brand: bonus(candidate.same_brand, scoring.same_brand_bonus),
        original_store: bonus(original_store, scoring.original_store_bonus),
        preferred_store: bonus(preferred, scoring.preferred_store_bonus),
        size_match: bonus(size_match, scoring.size_match_bonus),
        cheaper: bonus(cheaper, scoring.cheaper_bonus),
    }
}

/// Total order used for ranking: score desc, price asc, offer id asc.
/// Pass only separates two instances of the same offer.
#[must_use]
pub fn compare_ranked(a: &CandidateSuggestion, b: &CandidateSuggestion) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.offer.price.cmp(&b.offer.price))
        .then_with(|| a.offer.id.cmp(&b.offer.id))
        .then_with(|| a.pass.cmp(&b.pass))
}

/// Scores, explains and orders `candidates`, assigning 1-based ranks.
///
/// Duplicate offers collapse to their best-scoring instance.
#[must_use]
pub fn rank_candidates(
    original: &ListItem,
    candidates: Vec<CandidateSuggestion>,
    ctx: &RankingContext<'_>,
) -> Vec<CandidateSuggestion> {
    let mut by_offer: HashMap<Uuid, CandidateSuggestion> = HashMap::new();

    for mut candidate in candidates {
        let breakdown = score_candidate(original, &candidate, ctx);
        candidate.breakdown = breakdown;
        candidate.score = breakdown.total();
        candidate.original_store = original
            .original_store()
            .is_some_and(|s| s == candidate.offer.store_id);
        candidate.price_delta = original
            .original_price()
            .map(|price| candidate.offer.price - price);
        candidate.explanation = explain(&candidate, original.original_price());

        match by_offer.get(&candidate.offer.id) {
            Some(existing) if compare_ranked(existing, &candidate) != Ordering::Greater => {}
            _ => {
                by_offer.insert(candidate.offer.id, candidate);
            }
        }
    }

    let mut ranked: Vec<CandidateSuggestion> = by_offer.into_values().collect();
    ranked.sort_by(compare_ranked);
    assign_ranks(&mut ranked);
    ranked
}

/// Truncates a ranked list to `k`, promoting the best same-brand candidate
/// into the last visible slot when none made the cut on score alone.
#[must_use]
pub fn select_top_k(ranked: Vec<CandidateSuggestion>, k: usize) -> Vec<CandidateSuggestion> {
    if k == 0 {
        return Vec::new();
    }

    let promoted = if ranked.iter().take(k).any(|c| c.same_brand) {
        None
    } else {
        ranked.iter().skip(k).find(|c| c.same_brand).cloned()
    };

    let mut top: Vec<CandidateSuggestion> = ranked.into_iter().take(k).collect();
    if let Some(candidate) = promoted {
        if top.len() == k {
            top.pop();
        }
        top.push(candidate);
    }
    assign_ranks(&mut top);
    top
}

pub(crate) fn assign_ranks(candidates: &mut [CandidateSuggestion]) {
    for (idx, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = u32::try_from(idx + 1).unwrap_or(u32::MAX);
    }
}

fn explain(candidate: &CandidateSuggestion, original_price: Option<Decimal>) -> String {
    let b = &candidate.breakdown;
    let mut out = format!("similarity {:.2}", b.similarity);
    if candidate.pass == SearchPass::Loose {
        out.push_str(" (name-only match)");
    }

    let parts = [
        ("same brand", b.same_brand),
        ("original store", b.original_store),
        ("preferred store", b.preferred_store),
        ("similar size", b.size_match),
        ("cheaper", b.cheaper),
    ];
    for (label, value) in parts {
        if value > 0.0 {
            let _ = write!(out, "; {label} +{value:.1}");
        }
    }

    if let Some(price) = original_price.filter(|p| !p.is_zero()) {
        let delta = candidate.offer.price - price;
        let pct = (delta / price * Decimal::ONE_HUNDRED)
            .round_dp(1)
            .to_f64()
            .unwrap_or(0.0);
        if delta.is_sign_positive() && !delta.is_zero() {
            let _ = write!(out, "; {pct:.1}% more expensive");
        } else if delta.is_sign_negative() {
            let _ = write!(out, "; {:.1}% cheaper", -pct);
        } else {
            out.push_str("; same price");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use flyerwise_core::{PackageSize, SizeUnit};

    use super::*;
    use crate::testing::{candidate, item};

    fn ctx<'a>(scoring: &'a ScoringConfig, preferred: &'a [String]) -> RankingContext<'a> {
        RankingContext {
            scoring,
            preferred_stores: preferred,
        }
    }

    #[test]
    fn bonuses_are_additive_constants() {
        let scoring = ScoringConfig::default();
        let original = item("whole milk", Some("Brand A"), Some(("store-x", 150)));
        let c = candidate("store-x", 140, 0.5, true);
        let preferred = vec!["store-x".to_string(), "store-x".to_string()];
        let b = score_candidate(&original, &c, &ctx(&scoring, &preferred));

        assert!((b.similarity - 0.5).abs() < 1e-12);
        assert!((b.same_brand - 3.0).abs() < 1e-12);
        assert!((b.original_store - 2.0).abs() < 1e-12);
        // Listed twice, applied once.
        assert!((b.preferred_store - 2.0).abs() < 1e-12);
        assert!((b.cheaper - 1.0).abs() < 1e-12);
        assert!(b.size_match.abs() < 1e-12);
        assert!((b.total() - 8.5).abs() < 1e-12);
    }

    #[test]
    fn size_bonus_respects_tolerance() {
        let scoring = ScoringConfig::default();
        let mut original = item("whole milk", None, Some(("store-x", 150)));
        if let Some(origin) = original.origin.as_mut() {
            origin.package = Some(PackageSize::new(1000.0, SizeUnit::Millilitre));
        }
        let mut close = candidate("store-y", 150, 0.5, false);
        close.offer.package = Some(PackageSize::new(900.0, SizeUnit::Millilitre));
        let mut far = candidate("store-y", 150, 0.5, false);
        far.offer.package = Some(PackageSize::new(500.0, SizeUnit::Millilitre));

        let c = ctx(&scoring, &[]);
        assert!(score_candidate(&original, &close, &c).size_match > 0.0);
        assert!(score_candidate(&original, &far, &c).size_match.abs() < 1e-12);
    }

    #[test]
    fn ties_break_on_price_then_offer_id() {
        let scoring = ScoringConfig::default();
        let original = item("whole milk", None, None);
        let cheap = candidate("store-y", 100, 0.5, false);
        let pricey = candidate("store-y", 200, 0.5, false);
        let mut same_a = candidate("store-y", 150, 0.5, false);
        let mut same_b = candidate("store-y", 150, 0.5, false);
        if same_a.offer.id > same_b.offer.id {
            std::mem::swap(&mut same_a, &mut same_b);
        }
        let ids = (same_a.offer.id, same_b.offer.id);

        let ranked = rank_candidates(
            &original,
            vec![pricey, same_b, cheap, same_a],
            &ctx(&scoring, &[]),
        );
        let prices: Vec<i64> = ranked
            .iter()
            .map(|c| (c.offer.price * Decimal::ONE_HUNDRED).to_i64().unwrap())
            .collect();
        assert_eq!(prices, vec![100, 150, 150, 200]);
        assert_eq!(ranked[1].offer.id, ids.0);
        assert_eq!(ranked[2].offer.id, ids.1);
        assert_eq!(ranked.iter().map(|c| c.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn ranking_is_independent_of_input_order() {
        let scoring = ScoringConfig::default();
        let original = item("whole milk", Some("Brand A"), Some(("store-x", 150)));
        let pool = vec![
            candidate("store-x", 160, 0.9, true),
            candidate("store-y", 120, 0.7, false),
            candidate("store-z", 120, 0.7, false),
            candidate("store-y", 199, 0.95, false),
            candidate("store-x", 150, 0.4, true),
        ];
        let preferred = vec!["store-y".to_string()];
        let c = ctx(&scoring, &preferred);
        let baseline = rank_candidates(&original, pool.clone(), &c);

        // Every rotation and the reversal must produce the same ordering and scores.
        for shift in 0..pool.len() {
            let mut permuted = pool.clone();
            permuted.rotate_left(shift);
            assert_eq!(rank_candidates(&original, permuted.clone(), &c), baseline);
            permuted.reverse();
            assert_eq!(rank_candidates(&original, permuted, &c), baseline);
        }
    }

    #[test]
    fn duplicate_offers_collapse_to_best_instance() {
        let scoring = ScoringConfig::default();
        let original = item("whole milk", None, None);
        let strong = candidate("store-y", 100, 0.9, false);
        let mut loose = strong.clone();
        loose.raw_score = 0.5;
        loose.pass = SearchPass::Loose;
        let ranked = rank_candidates(&original, vec![loose, strong], &ctx(&scoring, &[]));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].pass, SearchPass::Strong);
    }

    #[test]
    fn same_brand_same_store_wins_despite_price_increase() {
        // Expired offer: Brand A milk at store X for 1.50.
        let scoring = ScoringConfig::default();
        let original = item("milk", Some("Brand A"), Some(("store-x", 150)));
        let same = candidate("store-x", 160, 0.8, true);
        let same_id = same.offer.id;
        let ranked = rank_candidates(
            &original,
            vec![
                candidate("store-y", 110, 0.9, false),
                candidate("store-z", 99, 0.85, false),
                same,
            ],
            &ctx(&scoring, &[]),
        );

        let top = &ranked[0];
        assert_eq!(top.offer.id, same_id);
        assert!(top.same_brand && top.original_store);
        assert_eq!(top.price_delta, Some(Decimal::new(10, 2)));
        assert!(top.explanation.contains("same brand"));
        assert!(top.explanation.contains("6.7% more expensive"), "{}", top.explanation);
    }

    #[test]
    fn top_k_promotes_same_brand_candidate() {
        let scoring = ScoringConfig {
            same_brand_bonus: 0.0,
            ..ScoringConfig::default()
        };
        let original = item("whole milk", Some("Brand A"), None);
        let weak_same_brand = candidate("store-z", 300, 0.21, true);
        let weak_id = weak_same_brand.offer.id;
        let ranked = rank_candidates(
            &original,
            vec![
                candidate("store-x", 100, 0.9, false),
                candidate("store-y", 100, 0.8, false),
                candidate("store-y", 110, 0.7, false),
                weak_same_brand,
            ],
            &ctx(&scoring, &[]),
        );
        assert_eq!(ranked.last().unwrap().offer.id, weak_id);

        let shown = select_top_k(ranked, 2);
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].offer.id, weak_id);
        assert_eq!(shown[1].rank, 2);
    }

    #[test]
    fn top_k_leaves_order_alone_when_brand_already_visible() {
        let scoring = ScoringConfig::default();
        let original = item("whole milk", Some("Brand A"), None);
        let ranked = rank_candidates(
            &original,
            vec![
                candidate("store-x", 100, 0.9, true),
                candidate("store-y", 100, 0.8, false),
                candidate("store-y", 110, 0.7, true),
            ],
            &ctx(&scoring, &[]),
        );
        let expected: Vec<Uuid> = ranked.iter().take(2).map(|c| c.offer.id).collect();
        let shown = select_top_k(ranked, 2);
        assert_eq!(shown.iter().map(|c| c.offer.id).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn top_k_of_zero_is_empty() {
        assert!(select_top_k(vec![candidate("store-x", 100, 0.9, true)], 0).is_empty());
    }
}
