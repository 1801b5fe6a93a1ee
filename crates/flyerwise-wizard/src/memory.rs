//! In-process capability implementations for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flyerwise_core::{FlyerOffer, ListItem};
use uuid::Uuid;

use crate::error::StoreError;
use crate::recorder::OfferSnapshot;
use crate::session::{SessionState, WizardSession};
use crate::store::{
    BatchReceipt, CatalogReader, ListOperation, SessionStore, ShoppingListStore, SnapshotStore,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, WizardSession>>,
}

impl InMemorySessionStore {
    /// Number of stored sessions in any state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(lock(&self.sessions)?.len())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<WizardSession>, StoreError> {
        Ok(lock(&self.sessions)?.get(&id).cloned())
    }

    async fn find_active_for_list(
        &self,
        list_id: Uuid,
    ) -> Result<Option<WizardSession>, StoreError> {
        Ok(lock(&self.sessions)?
            .values()
            .find(|s| s.list_id == list_id && !s.state.is_terminal())
            .cloned())
    }

    async fn insert(&self, session: &WizardSession) -> Result<(), StoreError> {
        let mut sessions = lock(&self.sessions)?;
        let clash = sessions.contains_key(&session.id)
            || sessions
                .values()
                .any(|s| s.list_id == session.list_id && !s.state.is_terminal());
        if clash {
            return Err(StoreError::Conflict);
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn save(&self, session: &WizardSession, expected_revision: i64) -> Result<(), StoreError> {
        let mut sessions = lock(&self.sessions)?;
        let stored = sessions.get_mut(&session.id).ok_or(StoreError::NotFound)?;
        if stored.revision != expected_revision {
            return Err(StoreError::Conflict);
        }
        *stored = session.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(lock(&self.sessions)?.remove(&id).is_some())
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        completed_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut sessions = lock(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|_, s| {
            let cutoff = if s.state == SessionState::Completed {
                completed_before
            } else {
                now
            };
            s.expires_at > cutoff
        });
        Ok(u64::try_from(before - sessions.len()).unwrap_or(u64::MAX))
    }
}

// ---------------------------------------------------------------------------
// Shopping lists
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ListState {
    items: HashMap<Uuid, Vec<ListItem>>,
    batches: HashMap<Uuid, BatchReceipt>,
}

#[derive(Debug, Default)]
pub struct InMemoryShoppingList {
    state: Mutex<ListState>,
    mutations: AtomicUsize,
}

impl InMemoryShoppingList {
    #[must_use]
    pub fn new(items: Vec<ListItem>) -> Self {
        let mut by_list: HashMap<Uuid, Vec<ListItem>> = HashMap::new();
        for item in items {
            by_list.entry(item.list_id).or_default().push(item);
        }
        Self {
            state: Mutex::new(ListState {
                items: by_list,
                batches: HashMap::new(),
            }),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Current items of a list, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the store lock is poisoned.
    pub fn items(&self, list_id: Uuid) -> Result<Vec<ListItem>, StoreError> {
        Ok(lock(&self.state)?
            .items
            .get(&list_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Number of batches that actually changed a list.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShoppingListStore for InMemoryShoppingList {
    async fn list_items(&self, list_id: Uuid) -> Result<Vec<ListItem>, StoreError> {
        self.items(list_id)
    }

    async fn apply_batch(
        &self,
        list_id: Uuid,
        batch_id: Uuid,
        ops: &[ListOperation],
    ) -> Result<BatchReceipt, StoreError> {
        let mut state = lock(&self.state)?;
        if let Some(previous) = state.batches.get(&batch_id) {
            return Ok(BatchReceipt {
                replayed: true,
                ..previous.clone()
            });
        }

        let items = state.items.get(&list_id).cloned().unwrap_or_default();
        if ops
            .iter()
            .any(|op| !items.iter().any(|item| item.id == op.item_id()))
        {
            return Err(StoreError::NotFound);
        }

        // Work on a copy so a failure leaves the list untouched.
        let mut next = items;
        for op in ops {
            match op {
                ListOperation::Replace { item_id, origin } => {
                    if let Some(item) = next.iter_mut().find(|i| i.id == *item_id) {
                        item.offer_id = Some(origin.offer_id);
                        item.origin = Some(origin.clone());
                    }
                }
                ListOperation::Keep { item_id } => {
                    if let Some(item) = next.iter_mut().find(|i| i.id == *item_id) {
                        item.offer_id = None;
                        item.origin = None;
                    }
                }
                ListOperation::Remove { item_id } => next.retain(|i| i.id != *item_id),
            }
        }

        let receipt = BatchReceipt {
            batch_id,
            list_id,
            applied: ops.len(),
            replayed: false,
            applied_at: Utc::now(),
        };
        state.items.insert(list_id, next);
        state.batches.insert(batch_id, receipt.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct InMemoryCatalog {
    version: AtomicI64,
    offers: Mutex<HashMap<Uuid, FlyerOffer>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new(version: i64, offers: Vec<FlyerOffer>) -> Self {
        Self {
            version: AtomicI64::new(version),
            offers: Mutex::new(offers.into_iter().map(|o| (o.id, o)).collect()),
        }
    }

    /// Simulates a flyer ingest. Returns the new version.
    pub fn bump_version(&self) -> i64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the store lock is poisoned.
    pub fn upsert(&self, offer: FlyerOffer) -> Result<(), StoreError> {
        lock(&self.offers)?.insert(offer.id, offer);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the store lock is poisoned.
    pub fn remove(&self, offer_id: Uuid) -> Result<(), StoreError> {
        lock(&self.offers)?.remove(&offer_id);
        Ok(())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new(1, Vec::new())
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn dataset_version(&self) -> Result<i64, StoreError> {
        Ok(self.version.load(Ordering::SeqCst))
    }

    async fn offers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<FlyerOffer>, StoreError> {
        let offers = lock(&self.offers)?;
        Ok(ids.iter().filter_map(|id| offers.get(id).cloned()).collect())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    rows: Mutex<Vec<OfferSnapshot>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn insert_if_absent(&self, snapshot: &OfferSnapshot) -> Result<bool, StoreError> {
        let mut rows = lock(&self.rows)?;
        if rows.iter().any(|row| row.key() == snapshot.key()) {
            return Ok(false);
        }
        rows.push(snapshot.clone());
        Ok(true)
    }

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<OfferSnapshot>, StoreError> {
        Ok(lock(&self.rows)?
            .iter()
            .filter(|row| row.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use flyerwise_core::OfferOrigin;
    use rust_decimal::Decimal;

    use super::*;
    use crate::filters::SessionFilters;

    fn list_item(list_id: Uuid) -> ListItem {
        ListItem {
            id: Uuid::new_v4(),
            list_id,
            text: "milk".into(),
            offer_id: None,
            product: None,
            origin: None,
        }
    }

    fn session(list_id: Uuid, ttl_minutes: i64) -> WizardSession {
        WizardSession::new(
            list_id,
            Vec::new(),
            SessionFilters::default(),
            1,
            Utc::now(),
            Duration::minutes(ttl_minutes),
        )
    }

    #[tokio::test]
    async fn save_requires_matching_revision() {
        let store = InMemorySessionStore::default();
        let mut s = session(Uuid::new_v4(), 30);
        store.insert(&s).await.unwrap();

        s.revision = 1;
        store.save(&s, 0).await.unwrap();
        assert!(matches!(store.save(&s, 0).await, Err(StoreError::Conflict)));
        assert_eq!(store.load(s.id).await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn one_open_session_per_list() {
        let store = InMemorySessionStore::default();
        let list = Uuid::new_v4();
        let first = session(list, 30);
        store.insert(&first).await.unwrap();
        assert!(matches!(
            store.insert(&session(list, 30)).await,
            Err(StoreError::Conflict)
        ));
        assert_eq!(
            store.find_active_for_list(list).await.unwrap().map(|s| s.id),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn purge_removes_only_lapsed_sessions() {
        let store = InMemorySessionStore::default();
        store.insert(&session(Uuid::new_v4(), -1)).await.unwrap();
        store.insert(&session(Uuid::new_v4(), 30)).await.unwrap();
        let now = Utc::now();
        assert_eq!(store.purge_expired(now, now).await.unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn completed_sessions_outlive_expiry_until_the_retention_cutoff() {
        let store = InMemorySessionStore::default();
        let mut done = session(Uuid::new_v4(), -5);
        done.state = SessionState::Completed;
        store.insert(&done).await.unwrap();
        store.insert(&session(Uuid::new_v4(), -5)).await.unwrap();

        let now = Utc::now();
        assert_eq!(
            store.purge_expired(now, now - Duration::hours(24)).await.unwrap(),
            1
        );
        assert!(store.load(done.id).await.unwrap().is_some());
        assert_eq!(store.purge_expired(now, now).await.unwrap(), 1);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_is_atomic_and_idempotent() {
        let list = Uuid::new_v4();
        let (a, b) = (list_item(list), list_item(list));
        let lists = InMemoryShoppingList::new(vec![a.clone(), b.clone()]);
        let batch = Uuid::new_v4();

        let bad = [
            ListOperation::Remove { item_id: a.id },
            ListOperation::Keep { item_id: Uuid::new_v4() },
        ];
        assert!(matches!(
            lists.apply_batch(list, Uuid::new_v4(), &bad).await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(lists.items(list).unwrap().len(), 2);

        let origin = OfferOrigin {
            offer_id: Uuid::new_v4(),
            store_id: "store-x".into(),
            price: Decimal::new(160, 2),
            package: None,
        };
        let ops = [
            ListOperation::Replace {
                item_id: a.id,
                origin: origin.clone(),
            },
            ListOperation::Remove { item_id: b.id },
        ];
        let first = lists.apply_batch(list, batch, &ops).await.unwrap();
        assert!(!first.replayed);
        assert_eq!(first.applied, 2);

        let again = lists.apply_batch(list, batch, &ops).await.unwrap();
        assert!(again.replayed);
        assert_eq!(again.applied_at, first.applied_at);
        assert_eq!(lists.mutation_count(), 1);

        let items = lists.items(list).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].offer_id, Some(origin.offer_id));
        assert_eq!(items[0].origin.as_ref(), Some(&origin));
    }

    #[tokio::test]
    async fn catalog_reports_missing_offers_by_omission() {
        let catalog = InMemoryCatalog::default();
        let missing = Uuid::new_v4();
        assert!(catalog.offers_by_ids(&[missing]).await.unwrap().is_empty());
        assert_eq!(catalog.dataset_version().await.unwrap(), 1);
        assert_eq!(catalog.bump_version(), 2);
    }
}
