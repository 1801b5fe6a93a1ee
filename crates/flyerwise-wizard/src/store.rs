//! Capability interfaces the wizard consumes.
//!
//! In-memory implementations live in [`crate::memory`]; Postgres ones in
//! the `flyerwise-db` crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flyerwise_core::{FlyerOffer, ListItem, OfferOrigin};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::recorder::OfferSnapshot;
use crate::session::WizardSession;

/// Durable session storage with revision-checked writes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<WizardSession>, StoreError>;

    /// The list's non-terminal session, if any, regardless of expiry.
    async fn find_active_for_list(&self, list_id: Uuid)
        -> Result<Option<WizardSession>, StoreError>;

    /// Stores a new session. Fails with [`StoreError::Conflict`] if the list
    /// already has a non-terminal session.
    async fn insert(&self, session: &WizardSession) -> Result<(), StoreError>;

    /// Overwrites the session only if the stored revision still equals
    /// `expected_revision`; otherwise [`StoreError::Conflict`].
    async fn save(&self, session: &WizardSession, expected_revision: i64)
        -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Deletes open or abandoned sessions whose expiry lies at or before
    /// `now`, and completed ones whose expiry lies at or before
    /// `completed_before`. Returns the number removed.
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        completed_before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// One mutation of a shopping-list item applied at commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ListOperation {
    Replace { item_id: Uuid, origin: OfferOrigin },
    Keep { item_id: Uuid },
    Remove { item_id: Uuid },
}

impl ListOperation {
    #[must_use]
    pub fn item_id(&self) -> Uuid {
        match self {
            Self::Replace { item_id, .. } | Self::Keep { item_id } | Self::Remove { item_id } => {
                *item_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: Uuid,
    pub list_id: Uuid,
    pub applied: usize,
    /// True when the batch had already been applied and nothing changed.
    pub replayed: bool,
    pub applied_at: DateTime<Utc>,
}

#[async_trait]
pub trait ShoppingListStore: Send + Sync {
    /// Current items of a list in presentation order; empty for an unknown
    /// list.
    async fn list_items(&self, list_id: Uuid) -> Result<Vec<ListItem>, StoreError>;

    /// Applies every operation or none. A repeated `batch_id` returns the
    /// original receipt with `replayed = true` and mutates nothing.
    async fn apply_batch(
        &self,
        list_id: Uuid,
        batch_id: Uuid,
        ops: &[ListOperation],
    ) -> Result<BatchReceipt, StoreError>;
}

/// Read-only view of the flyer catalog.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Monotonic freshness marker; changes whenever flyer data changes.
    async fn dataset_version(&self) -> Result<i64, StoreError>;

    /// Offers that still exist among `ids`, in no particular order.
    async fn offers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<FlyerOffer>, StoreError>;
}

/// Append-only snapshot storage, unique on
/// `(item_id, session_id, offer_id, store_id)`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns `false` when a snapshot for the same tuple already exists.
    async fn insert_if_absent(&self, snapshot: &OfferSnapshot) -> Result<bool, StoreError>;

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<OfferSnapshot>, StoreError>;
}
