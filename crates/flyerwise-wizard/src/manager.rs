//! The wizard session manager.
//!
//! Every mutating operation holds the session's [`BusyGuard`] for its whole
//! duration and persists through a revision-checked write, so two callers
//! can never interleave read-then-write cycles on one session. Expiry is
//! detected lazily on each access.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Duration;
use flyerwise_core::{
    normalize_text, FlyerOffer, ListItem, MigrationEligibility, OfferOrigin, ScoringConfig,
};
use flyerwise_matching::{
    apply_store_selection, rank_candidates, select_stores, select_top_k, CandidateFinder,
    CandidateSuggestion, RankingContext, SimilaritySearch,
};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::WizardError;
use crate::filters::SessionFilters;
use crate::guard::{BusyGuard, BusySet};
use crate::outcome::{
    BulkAction, BulkDecision, BulkOutcome, BulkScope, CompleteOutcome, DecisionRequest, Progress,
    StaleItem, StaleReason, StaleReport, StartOutcome, SuggestionsOutcome,
};
use crate::recorder::SnapshotRecorder;
use crate::session::{
    CompletionRecord, Decision, DecisionAction, ItemSuggestions, SessionState, WizardSession,
};
use crate::store::{CatalogReader, ListOperation, SessionStore, ShoppingListStore, SnapshotStore};

/// Everything the manager talks to.
#[derive(Clone)]
pub struct Capabilities {
    pub search: Arc<dyn SimilaritySearch>,
    pub sessions: Arc<dyn SessionStore>,
    pub lists: Arc<dyn ShoppingListStore>,
    pub catalog: Arc<dyn CatalogReader>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct WizardManager {
    finder: CandidateFinder,
    sessions: Arc<dyn SessionStore>,
    lists: Arc<dyn ShoppingListStore>,
    catalog: Arc<dyn CatalogReader>,
    recorder: SnapshotRecorder,
    clock: Arc<dyn Clock>,
    scoring: Arc<ScoringConfig>,
    session_ttl: Duration,
    completed_retention: Duration,
    busy: BusySet,
}

/// Default time a completed session outlives its expiry.
pub const DEFAULT_COMPLETED_RETENTION_HOURS: i64 = 24;

impl WizardManager {
    #[must_use]
    pub fn new(caps: Capabilities, scoring: Arc<ScoringConfig>, session_ttl: Duration) -> Self {
        Self {
            finder: CandidateFinder::new(caps.search, Arc::clone(&scoring)),
            sessions: caps.sessions,
            lists: caps.lists,
            catalog: caps.catalog,
            recorder: SnapshotRecorder::new(caps.snapshots, Arc::clone(&caps.clock)),
            clock: caps.clock,
            scoring,
            session_ttl,
            completed_retention: Duration::hours(DEFAULT_COMPLETED_RETENTION_HOURS),
            busy: BusySet::default(),
        }
    }

    /// Keeps completed sessions this long past their expiry, so a retried
    /// `complete` with the same idempotency key still replays.
    #[must_use]
    pub fn with_completed_retention(mut self, retention: Duration) -> Self {
        self.completed_retention = retention;
        self
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Opens a session over the list's items that need migration.
    ///
    /// Items that are free text or still linked to a live offer are left out
    /// and reported. If the list already has an open, unexpired session it is
    /// returned unchanged with `resumed = true`.
    ///
    /// # Errors
    ///
    /// - [`WizardError::InvalidDecision`] if an item belongs to another list.
    /// - [`WizardError::SessionBusy`] if another session for the list was
    ///   opened concurrently.
    /// - [`WizardError::Store`] on storage failure.
    pub async fn start_session(
        &self,
        list_id: Uuid,
        items: Vec<ListItem>,
        filters: SessionFilters,
    ) -> Result<StartOutcome, WizardError> {
        if let Some(stray) = items.iter().find(|item| item.list_id != list_id) {
            return Err(WizardError::invalid(format!(
                "item {} does not belong to list {list_id}",
                stray.id
            )));
        }

        let mut pending = Vec::new();
        let mut skipped_free_text = Vec::new();
        let mut skipped_live = Vec::new();
        for item in items {
            match item.migration_eligibility() {
                MigrationEligibility::Eligible => pending.push(item),
                MigrationEligibility::FreeText => skipped_free_text.push(item.id),
                MigrationEligibility::HasLiveOffer => skipped_live.push(item.id),
            }
        }

        if let Some(mut existing) = self.sessions.find_active_for_list(list_id).await? {
            if existing.has_lapsed(self.clock.now()) {
                self.mark_expired(&mut existing).await?;
            } else {
                tracing::info!(session_id = %existing.id, %list_id, "resuming open session");
                return Ok(StartOutcome {
                    session: existing,
                    resumed: true,
                    skipped_free_text,
                    skipped_live,
                });
            }
        }

        let dataset_version = self.catalog.dataset_version().await?;
        let session = WizardSession::new(
            list_id,
            pending,
            filters,
            dataset_version,
            self.clock.now(),
            self.session_ttl,
        );
        self.sessions.insert(&session).await?;

        tracing::info!(
            session_id = %session.id,
            %list_id,
            items = session.items.len(),
            free_text = skipped_free_text.len(),
            dataset_version,
            "migration session started"
        );

        Ok(StartOutcome {
            session,
            resumed: false,
            skipped_free_text,
            skipped_live,
        })
    }

    /// Loads the list's current items and opens a session over them. See
    /// [`Self::start_session`].
    ///
    /// # Errors
    ///
    /// As [`Self::start_session`].
    pub async fn start_for_list(
        &self,
        list_id: Uuid,
        filters: SessionFilters,
    ) -> Result<StartOutcome, WizardError> {
        let items = self.lists.list_items(list_id).await?;
        self.start_session(list_id, items, filters).await
    }

    /// # Errors
    ///
    /// [`WizardError::SessionNotFound`], or [`WizardError::SessionExpired`]
    /// once the session's time budget has elapsed.
    pub async fn get_session(&self, id: Uuid) -> Result<WizardSession, WizardError> {
        let session = self.load_current(id).await?;
        if session.state == SessionState::Expired {
            return Err(WizardError::SessionExpired);
        }
        Ok(session)
    }

    /// Cancels an open session. The shopping list is never touched.
    ///
    /// # Errors
    ///
    /// Busy, missing, expired and terminal sessions are rejected.
    pub async fn cancel(&self, id: Uuid) -> Result<WizardSession, WizardError> {
        let (_guard, mut session) = self.open(id).await?;
        require_open(&session)?;

        session.state = SessionState::Cancelled;
        self.persist(&mut session).await?;
        tracing::info!(session_id = %id, decided = session.decisions.len(), "session cancelled");
        Ok(session)
    }

    /// Storage housekeeping: deletes sessions past their expiry. Not needed
    /// for correctness since expiry is detected on access. Completed sessions
    /// are kept for the retention period on top of that.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::Store`] on storage failure.
    pub async fn purge_expired(&self) -> Result<u64, WizardError> {
        let now = self.clock.now();
        let purged = self
            .sessions
            .purge_expired(now, now - self.completed_retention)
            .await?;
        if purged > 0 {
            tracing::info!(purged, "purged expired sessions");
        }
        Ok(purged)
    }

    // -----------------------------------------------------------------------
    // Suggestions and decisions
    // -----------------------------------------------------------------------

    /// Returns the suggestions for `item_id`, or for the current item when
    /// `None`.
    ///
    /// The first call generates candidates for every item, selects stores
    /// once for the whole session and moves it to `InProgress`.
    ///
    /// # Errors
    ///
    /// - [`WizardError::SearchUnavailable`] if generation hits a search
    ///   outage; nothing is persisted and the call may be retried.
    /// - [`WizardError::InvalidDecision`] for an item outside the session.
    /// - Busy, missing, expired and terminal sessions are rejected.
    pub async fn suggestions(
        &self,
        id: Uuid,
        item_id: Option<Uuid>,
    ) -> Result<SuggestionsOutcome, WizardError> {
        let (_guard, mut session) = self.open(id).await?;
        require_open(&session)?;

        if session.state == SessionState::Initialized {
            self.generate(&mut session).await?;
            self.persist(&mut session).await?;
        }

        let item = match item_id {
            Some(item_id) => session
                .item(item_id)
                .ok_or_else(|| not_in_session(item_id))?,
            None => match session.current_item() {
                Some(item) => item,
                None => return Ok(SuggestionsOutcome::AllDecided),
            },
        };

        let shown = session.suggestions.get(&item.id);
        match shown.and_then(ItemSuggestions::no_candidates_reason) {
            Some(reason) => Ok(SuggestionsOutcome::NoCandidates {
                item: item.clone(),
                reason,
            }),
            None => Ok(SuggestionsOutcome::Candidates {
                item: item.clone(),
                suggestions: shown.map(|s| s.candidates.clone()).unwrap_or_default(),
                stores: session
                    .stores
                    .as_ref()
                    .map(|s| s.stores.clone())
                    .unwrap_or_default(),
            }),
        }
    }

    /// Records or replaces the decision for one item.
    ///
    /// `Replace` must name an offer from the item's last shown set; the whole
    /// shown set is snapshotted with the chosen offer marked selected.
    ///
    /// # Errors
    ///
    /// - [`WizardError::InvalidDecision`] for an unknown item, a missing or
    ///   foreign offer, or a session whose suggestions were never generated.
    ///   Session state is left untouched.
    /// - Busy, missing, expired and terminal sessions are rejected.
    pub async fn record_decision(
        &self,
        id: Uuid,
        request: DecisionRequest,
    ) -> Result<Progress, WizardError> {
        let (_guard, mut session) = self.open(id).await?;
        require_deciding(&session)?;

        let item_id = request.item_id;
        if session.item(item_id).is_none() {
            return Err(not_in_session(item_id));
        }

        let chosen = match (request.action, request.offer_id) {
            (DecisionAction::Replace, None) => {
                return Err(WizardError::invalid("replace requires an offer_id"));
            }
            (DecisionAction::Replace, Some(offer_id)) => {
                let shown = shown_candidates(&session, item_id);
                let candidate = shown
                    .iter()
                    .find(|c| c.offer.id == offer_id)
                    .ok_or_else(|| {
                        WizardError::invalid(format!(
                            "offer {offer_id} is not among the last suggestions for item {item_id}"
                        ))
                    })?;
                self.recorder
                    .record_shown(item_id, session.id, shown, offer_id)
                    .await?;
                Some(candidate.offer.clone())
            }
            (action, Some(_)) => {
                return Err(WizardError::invalid(format!(
                    "{action} does not take an offer_id"
                )));
            }
            (_, None) => None,
        };

        session.decisions.insert(
            item_id,
            Decision {
                item_id,
                action: request.action,
                offer: chosen,
                decided_at: self.clock.now(),
            },
        );
        session.settle_progress();
        self.persist(&mut session).await?;

        tracing::debug!(
            session_id = %id,
            %item_id,
            action = %request.action,
            state = %session.state,
            "decision recorded"
        );
        Ok(Progress::from(&session))
    }

    /// Applies one action to every undecided item in scope.
    ///
    /// # Errors
    ///
    /// - [`WizardError::InvalidDecision`] for an empty brand/category name,
    ///   an item outside the session, or a session without suggestions.
    /// - Busy, missing, expired and terminal sessions are rejected.
    pub async fn apply_bulk(
        &self,
        id: Uuid,
        bulk: BulkDecision,
    ) -> Result<BulkOutcome, WizardError> {
        let (_guard, mut session) = self.open(id).await?;
        require_deciding(&session)?;

        let targets = scope_items(&session, &bulk.scope)?;
        let now = self.clock.now();
        let mut applied = Vec::new();
        let mut left_undecided = Vec::new();

        for item_id in targets {
            let (action, offer) = match bulk.action {
                BulkAction::AcceptTop => {
                    let shown = shown_candidates(&session, item_id);
                    let Some(top) = shown.iter().find(|c| !c.out_of_selection) else {
                        left_undecided.push(item_id);
                        continue;
                    };
                    self.recorder
                        .record_shown(item_id, session.id, shown, top.offer.id)
                        .await?;
                    (DecisionAction::Replace, Some(top.offer.clone()))
                }
                BulkAction::Keep => (DecisionAction::Keep, None),
                BulkAction::Remove => (DecisionAction::Remove, None),
                BulkAction::Skip => (DecisionAction::Skip, None),
            };
            session.decisions.insert(
                item_id,
                Decision {
                    item_id,
                    action,
                    offer,
                    decided_at: now,
                },
            );
            applied.push(item_id);
        }

        session.settle_progress();
        self.persist(&mut session).await?;

        tracing::info!(
            session_id = %id,
            action = ?bulk.action,
            applied = applied.len(),
            left = left_undecided.len(),
            "bulk decision applied"
        );
        Ok(BulkOutcome {
            applied,
            left_undecided,
            progress: Progress::from(&session),
        })
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Commits every decision to the shopping list in one atomic batch.
    ///
    /// A completed session called again with the same `idempotency_key`
    /// returns the stored result without touching the catalog or the list.
    /// If the catalog's dataset version moved since the session started,
    /// nothing is applied: the outcome is [`CompleteOutcome::StaleData`],
    /// decisions pointing at offers that are gone, repriced or out of their
    /// validity window are cleared, every shown set is rebuilt from live
    /// offers, and the session stays `Reviewing` stamped with the live
    /// version.
    ///
    /// # Errors
    ///
    /// - [`WizardError::InvalidDecision`] unless the session is `Reviewing`
    ///   with every item decided.
    /// - [`WizardError::SessionTerminal`] for a completed session called
    ///   without its original key.
    /// - Busy, missing, expired and cancelled sessions are rejected.
    pub async fn complete(
        &self,
        id: Uuid,
        idempotency_key: Option<&str>,
    ) -> Result<CompleteOutcome, WizardError> {
        let _guard = self.acquire(id)?;
        let mut session = self
            .sessions
            .load(id)
            .await?
            .ok_or(WizardError::SessionNotFound)?;

        if session.state == SessionState::Completed {
            return match (&session.completion, idempotency_key) {
                (Some(record), Some(key)) if record.idempotency_key.as_deref() == Some(key) => {
                    tracing::info!(session_id = %id, "completion replayed from stored result");
                    Ok(CompleteOutcome::Completed {
                        record: record.clone(),
                        replayed: true,
                    })
                }
                _ => Err(WizardError::terminal(SessionState::Completed)),
            };
        }

        self.check_expiry(&mut session).await?;
        match session.state {
            SessionState::Reviewing => {}
            state if state.is_terminal() => return Err(WizardError::terminal(state)),
            _ => {
                return Err(WizardError::invalid(
                    "every item needs a decision before completing",
                ))
            }
        }
        let undecided = session.undecided();
        if !undecided.is_empty() {
            return Err(WizardError::invalid(format!(
                "{} item(s) still need a decision",
                undecided.len()
            )));
        }

        let live_version = self.catalog.dataset_version().await?;
        if live_version != session.dataset_version {
            let report = self.revalidate(&mut session, live_version).await?;
            self.persist(&mut session).await?;
            tracing::warn!(
                session_id = %id,
                session_version = report.session_version,
                live_version,
                stale_items = report.items.len(),
                "catalog changed since session start; completion refused"
            );
            return Ok(CompleteOutcome::StaleData(report));
        }

        let (ops, tally) = build_batch(&session);
        let receipt = self
            .lists
            .apply_batch(session.list_id, session.id, &ops)
            .await?;
        let record = CompletionRecord {
            idempotency_key: idempotency_key.map(ToOwned::to_owned),
            receipt,
            replaced: tally.replaced,
            kept: tally.kept,
            removed: tally.removed,
            skipped: tally.skipped,
            completed_at: self.clock.now(),
        };

        session.completion = Some(record.clone());
        session.state = SessionState::Completed;
        self.persist(&mut session).await?;

        tracing::info!(
            session_id = %id,
            list_id = %session.list_id,
            replaced = record.replaced,
            kept = record.kept,
            removed = record.removed,
            skipped = record.skipped,
            "migration committed"
        );
        Ok(CompleteOutcome::Completed {
            record,
            replayed: false,
        })
    }

    /// Checks the session against the live catalog after a version change.
    ///
    /// Chosen offers that are gone, repriced or outside their validity
    /// window are reported and their decisions cleared. Every shown set is
    /// then rebuilt from live data: vanished or ended offers are dropped,
    /// repriced ones carry the live price, and the set is re-ranked and
    /// re-filtered so later decisions can only pick current offers.
    async fn revalidate(
        &self,
        session: &mut WizardSession,
        live_version: i64,
    ) -> Result<StaleReport, WizardError> {
        let now = self.clock.now();
        let chosen: Vec<(Uuid, FlyerOffer)> = session
            .decisions
            .values()
            .filter_map(|d| d.offer.clone().map(|offer| (d.item_id, offer)))
            .collect();
        let mut ids: Vec<Uuid> = chosen.iter().map(|(_, offer)| offer.id).collect();
        ids.extend(
            session
                .suggestions
                .values()
                .flat_map(|shown| shown.candidates.iter().map(|c| c.offer.id)),
        );
        ids.sort_unstable();
        ids.dedup();
        let live: HashMap<Uuid, FlyerOffer> = self
            .catalog
            .offers_by_ids(&ids)
            .await?
            .into_iter()
            .map(|offer| (offer.id, offer))
            .collect();

        let mut stale = Vec::new();
        for (item_id, offer) in chosen {
            let reason = match live.get(&offer.id) {
                None => Some(StaleReason::Missing),
                Some(current) if current.price != offer.price => Some(StaleReason::PriceChanged {
                    was: offer.price,
                    now: current.price,
                }),
                Some(current) if !current.is_valid_at(now) => Some(StaleReason::OutsideValidity {
                    valid_from: current.valid_from,
                    valid_until: current.valid_until,
                }),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                stale.push(StaleItem {
                    item_id,
                    offer_id: offer.id,
                    reason,
                });
            }
        }
        for entry in &stale {
            session.decisions.remove(&entry.item_id);
        }

        let filters = session.filters.clone();
        let ctx = RankingContext {
            scoring: &self.scoring,
            preferred_stores: &filters.preferred_stores,
        };
        for item in &session.items {
            let Some(shown) = session.suggestions.get_mut(&item.id) else {
                continue;
            };
            let refreshed: Vec<CandidateSuggestion> = std::mem::take(&mut shown.candidates)
                .into_iter()
                .filter_map(|mut candidate| {
                    let current = live.get(&candidate.offer.id)?;
                    if !current.is_valid_at(now) {
                        return None;
                    }
                    candidate.offer = current.clone();
                    Some(candidate)
                })
                .collect();
            let original_price = item.original_price();
            let admitted: Vec<CandidateSuggestion> = rank_candidates(item, refreshed, &ctx)
                .into_iter()
                .filter(|c| filters.admits(c, original_price))
                .collect();
            shown.candidates = match &session.stores {
                Some(selection) => apply_store_selection(admitted, selection, self.scoring.top_k),
                None => select_top_k(admitted, self.scoring.top_k),
            };
        }

        let report = StaleReport {
            session_id: session.id,
            session_version: session.dataset_version,
            live_version,
            items: stale,
        };
        session.dataset_version = live_version;
        session.current_index = 0;
        session.advance();
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn generate(&self, session: &mut WizardSession) -> Result<(), WizardError> {
        let finder_filters = session.filters.finder_filters();
        let ctx = RankingContext {
            scoring: &self.scoring,
            preferred_stores: &session.filters.preferred_stores,
        };

        let mut ranked: BTreeMap<Uuid, Vec<CandidateSuggestion>> = BTreeMap::new();
        let mut found: BTreeMap<Uuid, usize> = BTreeMap::new();
        for item in &session.items {
            let candidates = self.finder.find_candidates(item, &finder_filters).await?;
            found.insert(item.id, candidates.len());
            let original_price = item.original_price();
            let admitted: Vec<CandidateSuggestion> = rank_candidates(item, candidates, &ctx)
                .into_iter()
                .filter(|c| session.filters.admits(c, original_price))
                .collect();
            ranked.insert(item.id, admitted);
        }

        let selection = select_stores(&ranked, session.filters.max_stores, &self.scoring);
        for (item_id, candidates) in ranked {
            let shown = apply_store_selection(candidates, &selection, self.scoring.top_k);
            session.suggestions.insert(
                item_id,
                ItemSuggestions {
                    candidates: shown,
                    found: found.get(&item_id).copied().unwrap_or(0),
                },
            );
        }

        tracing::info!(
            session_id = %session.id,
            items = session.items.len(),
            stores = ?selection.stores,
            "suggestions generated"
        );
        session.stores = Some(selection);
        session.current_index = 0;
        session.settle_progress();
        Ok(())
    }

    fn acquire(&self, id: Uuid) -> Result<BusyGuard, WizardError> {
        self.busy.try_acquire(id).ok_or_else(|| {
            tracing::debug!(session_id = %id, "rejecting concurrent operation");
            WizardError::SessionBusy
        })
    }

    async fn open(&self, id: Uuid) -> Result<(BusyGuard, WizardSession), WizardError> {
        let guard = self.acquire(id)?;
        let session = self.load_current(id).await?;
        Ok((guard, session))
    }

    async fn load_current(&self, id: Uuid) -> Result<WizardSession, WizardError> {
        let mut session = self
            .sessions
            .load(id)
            .await?
            .ok_or(WizardError::SessionNotFound)?;
        self.check_expiry(&mut session).await?;
        Ok(session)
    }

    /// Persists the `Expired` transition on first access after the deadline.
    async fn check_expiry(&self, session: &mut WizardSession) -> Result<(), WizardError> {
        if session.has_lapsed(self.clock.now()) {
            self.mark_expired(session).await?;
            return Err(WizardError::SessionExpired);
        }
        Ok(())
    }

    async fn mark_expired(&self, session: &mut WizardSession) -> Result<(), WizardError> {
        session.state = SessionState::Expired;
        match self.persist(session).await {
            // Whoever won the race will see the deadline on their next access.
            Ok(()) | Err(WizardError::SessionBusy) => {}
            Err(e) => return Err(e),
        }
        tracing::info!(session_id = %session.id, expires_at = %session.expires_at, "session expired");
        Ok(())
    }

    async fn persist(&self, session: &mut WizardSession) -> Result<(), WizardError> {
        let expected = session.revision;
        session.revision += 1;
        self.sessions
            .save(session, expected)
            .await
            .map_err(WizardError::from)
    }
}

fn require_open(session: &WizardSession) -> Result<(), WizardError> {
    if session.state.is_terminal() {
        return Err(WizardError::terminal(session.state));
    }
    Ok(())
}

fn require_deciding(session: &WizardSession) -> Result<(), WizardError> {
    match session.state {
        SessionState::InProgress | SessionState::Reviewing => Ok(()),
        SessionState::Initialized => Err(WizardError::invalid(
            "suggestions have not been generated for this session yet",
        )),
        state => Err(WizardError::terminal(state)),
    }
}

fn not_in_session(item_id: Uuid) -> WizardError {
    WizardError::invalid(format!("item {item_id} is not part of this session"))
}

fn shown_candidates(session: &WizardSession, item_id: Uuid) -> &[CandidateSuggestion] {
    session
        .suggestions
        .get(&item_id)
        .map_or(&[], |s| s.candidates.as_slice())
}

/// Undecided items matching `scope`, in session order.
fn scope_items(session: &WizardSession, scope: &BulkScope) -> Result<Vec<Uuid>, WizardError> {
    let undecided = session
        .items
        .iter()
        .filter(|item| !session.decisions.contains_key(&item.id));

    let ids = match scope {
        BulkScope::AllUndecided => undecided.map(|item| item.id).collect(),
        BulkScope::Items { item_ids } => {
            if let Some(unknown) = item_ids.iter().find(|id| session.item(**id).is_none()) {
                return Err(not_in_session(*unknown));
            }
            undecided
                .filter(|item| item_ids.contains(&item.id))
                .map(|item| item.id)
                .collect()
        }
        BulkScope::Brand { name } => {
            let wanted = normalize_text(name);
            if wanted.is_empty() {
                return Err(WizardError::invalid("brand scope needs a non-empty name"));
            }
            undecided
                .filter(|item| {
                    item.product
                        .as_ref()
                        .and_then(|p| p.brand.as_deref())
                        .is_some_and(|brand| brand == wanted)
                })
                .map(|item| item.id)
                .collect()
        }
        BulkScope::Category { name } => {
            let wanted = name.trim();
            if wanted.is_empty() {
                return Err(WizardError::invalid("category scope needs a non-empty name"));
            }
            undecided
                .filter(|item| {
                    item.product
                        .as_ref()
                        .and_then(|p| p.category.as_deref())
                        .is_some_and(|category| category.eq_ignore_ascii_case(wanted))
                })
                .map(|item| item.id)
                .collect()
        }
    };
    Ok(ids)
}

#[derive(Debug, Default)]
struct Tally {
    replaced: usize,
    kept: usize,
    removed: usize,
    skipped: usize,
}

/// Turns decisions into list operations, in item order.
fn build_batch(session: &WizardSession) -> (Vec<ListOperation>, Tally) {
    let mut ops = Vec::new();
    let mut tally = Tally::default();

    for item in &session.items {
        let Some(decision) = session.decisions.get(&item.id) else {
            continue;
        };
        match (decision.action, decision.offer.as_ref()) {
            (DecisionAction::Replace, Some(offer)) => {
                ops.push(ListOperation::Replace {
                    item_id: item.id,
                    origin: OfferOrigin {
                        offer_id: offer.id,
                        store_id: offer.store_id.clone(),
                        price: offer.price,
                        package: offer.package,
                    },
                });
                tally.replaced += 1;
            }
            (DecisionAction::Keep, _) => {
                ops.push(ListOperation::Keep { item_id: item.id });
                tally.kept += 1;
            }
            (DecisionAction::Remove, _) => {
                ops.push(ListOperation::Remove { item_id: item.id });
                tally.removed += 1;
            }
            (DecisionAction::Skip | DecisionAction::Replace, _) => tally.skipped += 1,
        }
    }
    (ops, tally)
}
