//! Builders shared by this crate's unit tests.

use chrono::{Duration, Utc};
use flyerwise_core::{CanonicalProduct, FlyerOffer, ListItem, OfferOrigin};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::suggestion::{CandidateSuggestion, SearchPass};

pub(crate) fn offer(name: &str, brand: Option<&str>, store: &str, cents: i64) -> FlyerOffer {
    let now = Utc::now();
    FlyerOffer {
        id: Uuid::new_v4(),
        canonical_product_id: None,
        name: name.to_string(),
        brand: brand.map(ToOwned::to_owned),
        category: Some("dairy".to_string()),
        store_id: store.to_string(),
        price: Decimal::new(cents, 2),
        package: None,
        valid_from: now - Duration::days(1),
        valid_until: now + Duration::days(6),
    }
}

pub(crate) fn item(
    name: &str,
    brand: Option<&str>,
    origin: Option<(&str, i64)>,
) -> ListItem {
    ListItem {
        id: Uuid::new_v4(),
        list_id: Uuid::new_v4(),
        text: name.to_string(),
        offer_id: None,
        product: Some(CanonicalProduct::new(
            Uuid::new_v4(),
            name,
            brand,
            Some("dairy"),
            None,
        )),
        origin: origin.map(|(store, cents)| OfferOrigin {
            offer_id: Uuid::new_v4(),
            store_id: store.to_string(),
            price: Decimal::new(cents, 2),
            package: None,
        }),
    }
}

pub(crate) fn candidate(
    store: &str,
    cents: i64,
    raw_score: f64,
    same_brand: bool,
) -> CandidateSuggestion {
    let brand = if same_brand { "Brand A" } else { "Brand B" };
    CandidateSuggestion::unranked(
        offer("Whole Milk", Some(brand), store, cents),
        SearchPass::Strong,
        raw_score,
        same_brand,
    )
}
