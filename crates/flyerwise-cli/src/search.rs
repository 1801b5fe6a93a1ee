//! `search`: runs the candidate finder and ranking engine against the live
//! catalog for a single made-up list item. Read-only.

use std::sync::Arc;

use clap::Args;
use flyerwise_core::{parse_package_size, CanonicalProduct, ListItem, OfferOrigin, ScoringConfig};
use flyerwise_db::PgSimilaritySearch;
use flyerwise_matching::{
    rank_candidates, select_top_k, CandidateFinder, CandidateSuggestion, FinderFilters,
    RankingContext, SearchPass,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Product name, e.g. "whole milk"
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub brand: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    /// Package size as printed, e.g. "1 l" or "6 x 330 ml"
    #[arg(long)]
    pub size: Option<String>,
    /// Store the item was last bought from
    #[arg(long, requires = "price")]
    pub store: Option<String>,
    /// Price paid at that store, e.g. 1.50
    #[arg(long, requires = "store")]
    pub price: Option<Decimal>,
    /// Stores searched when no original store is given (repeatable)
    #[arg(long = "only-store")]
    pub only_stores: Vec<String>,
    /// Stores that earn the preferred-store bonus (repeatable)
    #[arg(long = "prefer")]
    pub preferred: Vec<String>,
}

/// The list item the search pretends to migrate.
pub(crate) fn build_item(args: &SearchArgs) -> ListItem {
    let package = args.size.as_deref().and_then(parse_package_size);
    let product = CanonicalProduct::new(
        Uuid::new_v4(),
        &args.name,
        args.brand.as_deref(),
        args.category.as_deref(),
        package,
    );
    let origin = match (&args.store, args.price) {
        (Some(store), Some(price)) => Some(OfferOrigin {
            offer_id: Uuid::nil(),
            store_id: store.clone(),
            price,
            package,
        }),
        _ => None,
    };
    ListItem {
        id: Uuid::new_v4(),
        list_id: Uuid::nil(),
        text: args.name.clone(),
        offer_id: None,
        product: Some(product),
        origin,
    }
}

pub(crate) fn format_row(candidate: &CandidateSuggestion) -> String {
    let pass = match candidate.pass {
        SearchPass::Strong => "strong",
        SearchPass::Loose => "loose",
    };
    let delta = candidate
        .price_delta
        .map_or_else(String::new, |d| format!(" ({d:+})"));
    format!(
        "#{rank:<2} {score:>6.2}  {pass:<6} {store:<12} {price:>8}{delta}  {brand} {name}\n      {explanation}",
        rank = candidate.rank,
        score = candidate.score,
        store = candidate.offer.store_id,
        price = candidate.offer.price,
        brand = candidate.offer.brand.as_deref().unwrap_or("-"),
        name = candidate.offer.name,
        explanation = candidate.explanation,
    )
}

pub(crate) async fn run_search(
    pool: &PgPool,
    scoring: &ScoringConfig,
    args: &SearchArgs,
) -> anyhow::Result<()> {
    let item = build_item(args);
    let finder = CandidateFinder::new(
        Arc::new(PgSimilaritySearch::new(pool.clone())),
        Arc::new(scoring.clone()),
    );
    let filters = FinderFilters {
        store_ids: args.only_stores.clone(),
        min_price: None,
        max_price: None,
    };

    let found = finder.find_candidates(&item, &filters).await?;
    let total = found.len();
    let ranked = rank_candidates(
        &item,
        found,
        &RankingContext {
            scoring,
            preferred_stores: &args.preferred,
        },
    );
    let shown = select_top_k(ranked, scoring.top_k);

    tracing::debug!(found = total, shown = shown.len(), "candidate search finished");
    if shown.is_empty() {
        println!("no candidates for \"{}\"", args.name);
        return Ok(());
    }
    println!("{} of {total} candidate(s):", shown.len());
    for candidate in &shown {
        println!("{}", format_row(candidate));
    }
    Ok(())
}
