//! Greedy store selection under a hard cap of two stores.
//!
//! 1. For every store, count the items it can cover (coverage) and sum the
//!    price of its best-ranked candidate per item.
//! 2. Order stores by coverage desc, total price asc, store id asc; the
//!    first one is always selected.
//! 3. With a cap of two, a second store is added only if it covers at
//!    least `second_store_min_items` extra items or saves at least
//!    `second_store_min_savings` against the first store alone.
//!
//! This is intentionally not an optimal set cover.

use std::collections::{BTreeMap, BTreeSet};

use flyerwise_core::ScoringConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ranking::{assign_ranks, compare_ranked, select_top_k};
use crate::suggestion::CandidateSuggestion;

const MAX_STORES: i64 = 2;

/// The accepted second store and why it earned its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondStore {
    pub store_id: String,
    pub additional_items: usize,
    pub savings: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSelection {
    /// Selected stores, primary first. Empty only when no item has any candidate.
    pub stores: Vec<String>,
    /// Cap after clamping to `[1, 2]`.
    pub max_stores: usize,
    /// Items the primary store covers.
    pub primary_coverage: usize,
    pub second: Option<SecondStore>,
}

impl StoreSelection {
    #[must_use]
    pub fn contains(&self, store_id: &str) -> bool {
        self.stores.iter().any(|s| s == store_id)
    }
}

#[derive(Debug, Default)]
struct StoreStats {
    /// Best candidate price per covered item.
    best_price: BTreeMap<Uuid, Decimal>,
    total: Decimal,
}

impl StoreStats {
    fn coverage(&self) -> usize {
        self.best_price.len()
    }
}

/// Clamps any requested store cap into `[1, 2]`.
#[must_use]
pub fn clamp_max_stores(requested: i64) -> usize {
    // Clamped to 1..=2, so the cast cannot truncate.
    usize::try_from(requested.clamp(1, MAX_STORES)).unwrap_or(1)
}

/// Chooses at most `clamp_max_stores(max_stores)` stores for the whole session.
#[must_use]
pub fn select_stores(
    candidates_by_item: &BTreeMap<Uuid, Vec<CandidateSuggestion>>,
    max_stores: i64,
    scoring: &ScoringConfig,
) -> StoreSelection {
    let cap = clamp_max_stores(max_stores);
    let stats = collect_stats(candidates_by_item);

    let mut ordered: Vec<(&String, &StoreStats)> = stats.iter().collect();
    ordered.sort_by(|(a_id, a), (b_id, b)| {
        b.coverage()
            .cmp(&a.coverage())
            .then_with(|| a.total.cmp(&b.total))
            .then_with(|| a_id.cmp(b_id))
    });

    let Some((primary_id, primary)) = ordered.first().copied() else {
        return StoreSelection {
            stores: Vec::new(),
            max_stores: cap,
            primary_coverage: 0,
            second: None,
        };
    };

    let mut selection = StoreSelection {
        stores: vec![primary_id.clone()],
        max_stores: cap,
        primary_coverage: primary.coverage(),
        second: None,
    };

    if cap < 2 {
        return selection;
    }

    let best_second = ordered
        .iter()
        .skip(1)
        .map(|(store_id, candidate)| marginal_gain(store_id, primary, candidate))
        .filter(|gain| {
            gain.additional_items >= scoring.second_store_min_items
                || gain.savings >= scoring.second_store_min_savings
        })
        .min_by(|a, b| {
            b.additional_items
                .cmp(&a.additional_items)
                .then_with(|| b.savings.cmp(&a.savings))
                .then_with(|| a.store_id.cmp(&b.store_id))
        });

    match best_second {
        Some(second) => {
            tracing::debug!(
                primary = %primary_id,
                second = %second.store_id,
                additional_items = second.additional_items,
                savings = %second.savings,
                "second store accepted"
            );
            selection.stores.push(second.store_id.clone());
            selection.second = Some(second);
        }
        None => {
            tracing::debug!(primary = %primary_id, "no second store met the thresholds");
        }
    }

    selection
}

fn collect_stats(
    candidates_by_item: &BTreeMap<Uuid, Vec<CandidateSuggestion>>,
) -> BTreeMap<String, StoreStats> {
    let mut stats: BTreeMap<String, StoreStats> = BTreeMap::new();

    for (item_id, candidates) in candidates_by_item {
        let mut best: BTreeMap<&str, &CandidateSuggestion> = BTreeMap::new();
        for candidate in candidates {
            best.entry(candidate.store_id())
                .and_modify(|current| {
                    if compare_ranked(candidate, current).is_lt() {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }
        for (store_id, candidate) in best {
            let entry = stats.entry(store_id.to_string()).or_default();
            entry.best_price.insert(*item_id, candidate.offer.price);
            entry.total += candidate.offer.price;
        }
    }

    stats
}

fn marginal_gain(store_id: &str, primary: &StoreStats, candidate: &StoreStats) -> SecondStore {
    let mut additional_items = 0;
    let mut savings = Decimal::ZERO;
    for (item_id, price) in &candidate.best_price {
        match primary.best_price.get(item_id) {
            Some(primary_price) if price < primary_price => savings += *primary_price - *price,
            Some(_) => {}
            None => additional_items += 1,
        }
    }
    SecondStore {
        store_id: store_id.to_string(),
        additional_items,
        savings,
    }
}

/// Restricts one item's ranked candidates to the selected stores and cuts
/// them to `top_k`.
///
/// If no same-brand candidate survives the store filter but one exists
/// elsewhere, the best such candidate is still shown, flagged
/// `out_of_selection`, in the last slot.
#[must_use]
pub fn apply_store_selection(
    ranked: Vec<CandidateSuggestion>,
    selection: &StoreSelection,
    top_k: usize,
) -> Vec<CandidateSuggestion> {
    let selected: BTreeSet<&str> = selection.stores.iter().map(String::as_str).collect();
    let (inside, outside): (Vec<_>, Vec<_>) = ranked
        .into_iter()
        .partition(|c| selected.contains(c.store_id()));

    let mut shown = select_top_k(inside, top_k);
    if top_k == 0 || shown.iter().any(|c| c.same_brand) {
        return shown;
    }

    if let Some(mut alternative) = outside.into_iter().find(|c| c.same_brand) {
        alternative.out_of_selection = true;
        if shown.len() == top_k {
            shown.pop();
        }
        shown.push(alternative);
        assign_ranks(&mut shown);
    }
    shown
}
