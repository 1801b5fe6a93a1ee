//! Append-only audit of what was offered and what was picked.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use flyerwise_matching::CandidateSuggestion;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::SnapshotStore;

/// Immutable record of one suggestion as it was shown. Never updated; a
/// later view of the same offer in another session is a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferSnapshot {
    pub id: Uuid,
    pub item_id: Uuid,
    pub session_id: Uuid,
    pub offer_id: Uuid,
    pub canonical_product_id: Option<Uuid>,
    pub store_id: String,
    pub price: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub rank: i32,
    pub score: f64,
    pub explanation: String,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

impl OfferSnapshot {
    /// The uniqueness key a store must enforce.
    #[must_use]
    pub fn key(&self) -> (Uuid, Uuid, Uuid, &str) {
        (self.item_id, self.session_id, self.offer_id, &self.store_id)
    }
}

pub struct SnapshotRecorder {
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
}

impl SnapshotRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Writes one snapshot. Returns `false` if the tuple was already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot store fails.
    pub async fn record(
        &self,
        item_id: Uuid,
        session_id: Uuid,
        candidate: &CandidateSuggestion,
        selected: bool,
    ) -> Result<bool, StoreError> {
        let offer = &candidate.offer;
        let snapshot = OfferSnapshot {
            id: Uuid::new_v4(),
            item_id,
            session_id,
            offer_id: offer.id,
            canonical_product_id: offer.canonical_product_id,
            store_id: offer.store_id.clone(),
            price: offer.price,
            valid_from: offer.valid_from,
            valid_until: offer.valid_until,
            rank: i32::try_from(candidate.rank).unwrap_or(i32::MAX),
            score: candidate.score,
            explanation: candidate.explanation.clone(),
            selected,
            created_at: self.clock.now(),
        };
        let written = self.store.insert_if_absent(&snapshot).await?;
        if !written {
            tracing::debug!(
                %item_id,
                %session_id,
                offer_id = %offer.id,
                "snapshot already recorded"
            );
        }
        Ok(written)
    }

    /// Records every candidate in a shown set, marking `chosen` as selected.
    /// Returns how many new rows were written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on the first failed write.
    pub async fn record_shown(
        &self,
        item_id: Uuid,
        session_id: Uuid,
        shown: &[CandidateSuggestion],
        chosen: Uuid,
    ) -> Result<usize, StoreError> {
        let mut written = 0;
        for candidate in shown {
            if self
                .record(item_id, session_id, candidate, candidate.offer.id == chosen)
                .await?
            {
                written += 1;
            }
        }
        Ok(written)
    }
}
