//! Persisted wizard session state.
//!
//! ```text
//! Initialized ──suggestions──▶ InProgress ──last decision──▶ Reviewing ──complete──▶ Completed
//!      │                          │  ▲                          │
//!      └──────────┬───────────────┘  └──────re-decide───────────┘
//!                 ▼
//!      Cancelled (cancel) / Expired (now >= expires_at, detected on access)
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use flyerwise_core::{FlyerOffer, ListItem};
use flyerwise_matching::{CandidateSuggestion, StoreSelection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filters::SessionFilters;
use crate::store::BatchReceipt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initialized,
    InProgress,
    Reviewing,
    Completed,
    Cancelled,
    Expired,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::InProgress => "in_progress",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "in_progress" => Ok(Self::InProgress),
            "reviewing" => Ok(Self::Reviewing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Link the item to the chosen offer.
    Replace,
    /// Drop the store-specific offer link, keep the product master.
    Keep,
    /// Delete the item on commit.
    Remove,
    /// Defer; nothing happens to the item on commit.
    Skip,
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Replace => "replace",
            Self::Keep => "keep",
            Self::Remove => "remove",
            Self::Skip => "skip",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub item_id: Uuid,
    pub action: DecisionAction,
    /// The chosen offer as it was shown; set only for `Replace`.
    pub offer: Option<FlyerOffer>,
    pub decided_at: DateTime<Utc>,
}

/// The filtered, ranked top-K set last shown for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSuggestions {
    pub candidates: Vec<CandidateSuggestion>,
    /// Candidates returned by the finder before any filtering.
    pub found: usize,
}

/// Why an item ended up with nothing to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoCandidatesReason {
    /// Neither search pass returned an offer above the similarity floor.
    NoMatch,
    /// Offers were found but none passed the session's price, brand or
    /// store constraints.
    Filtered,
}

impl ItemSuggestions {
    #[must_use]
    pub fn no_candidates_reason(&self) -> Option<NoCandidatesReason> {
        if !self.candidates.is_empty() {
            None
        } else if self.found == 0 {
            Some(NoCandidatesReason::NoMatch)
        } else {
            Some(NoCandidatesReason::Filtered)
        }
    }
}

/// Result of a successful commit, kept on the session for idempotent replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub idempotency_key: Option<String>,
    pub receipt: BatchReceipt,
    pub replaced: usize,
    pub kept: usize,
    pub removed: usize,
    pub skipped: usize,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardSession {
    pub id: Uuid,
    pub list_id: Uuid,
    pub state: SessionState,
    pub filters: SessionFilters,
    /// Catalog freshness marker captured at start (re-stamped after a
    /// stale completion attempt).
    pub dataset_version: i64,
    /// Items needing migration, in presentation order.
    pub items: Vec<ListItem>,
    pub decisions: BTreeMap<Uuid, Decision>,
    pub current_index: usize,
    pub suggestions: BTreeMap<Uuid, ItemSuggestions>,
    pub stores: Option<StoreSelection>,
    pub completion: Option<CompletionRecord>,
    /// Bumped on every persisted change; guards conditional writes.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WizardSession {
    #[must_use]
    pub fn new(
        list_id: Uuid,
        items: Vec<ListItem>,
        filters: SessionFilters,
        dataset_version: i64,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            list_id,
            state: SessionState::Initialized,
            filters,
            dataset_version,
            items,
            decisions: BTreeMap::new(),
            current_index: 0,
            suggestions: BTreeMap::new(),
            stores: None,
            completion: None,
            revision: 0,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// True once the time budget has elapsed on a session that is still open.
    #[must_use]
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && now >= self.expires_at
    }

    #[must_use]
    pub fn item(&self, item_id: Uuid) -> Option<&ListItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    #[must_use]
    pub fn current_item(&self) -> Option<&ListItem> {
        self.items
            .get(self.current_index)
            .filter(|item| !self.decisions.contains_key(&item.id))
    }

    #[must_use]
    pub fn undecided(&self) -> Vec<Uuid> {
        self.items
            .iter()
            .filter(|item| !self.decisions.contains_key(&item.id))
            .map(|item| item.id)
            .collect()
    }

    #[must_use]
    pub fn all_decided(&self) -> bool {
        self.items
            .iter()
            .all(|item| self.decisions.contains_key(&item.id))
    }

    /// Points `current_index` at the next undecided item, searching forward
    /// from the current position and wrapping around. When none is left the
    /// index moves past the end.
    pub fn advance(&mut self) {
        let len = self.items.len();
        let start = self.current_index.min(len);
        let next = (start..len)
            .chain(0..start)
            .find(|&idx| !self.decisions.contains_key(&self.items[idx].id));
        self.current_index = next.unwrap_or(len);
    }

    /// Advances to the next undecided item and moves forward through
    /// `Initialized → InProgress → Reviewing`. Never moves backwards: a
    /// reviewing session whose stale decisions were cleared stays reviewing.
    pub fn settle_progress(&mut self) {
        self.advance();
        if self.all_decided() {
            self.state = SessionState::Reviewing;
        } else if self.state == SessionState::Initialized {
            self.state = SessionState::InProgress;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn item() -> ListItem {
        ListItem {
            id: Uuid::new_v4(),
            list_id: Uuid::nil(),
            text: "milk".into(),
            offer_id: None,
            product: None,
            origin: None,
        }
    }

    fn session(n: usize) -> WizardSession {
        let now = Utc::now();
        WizardSession::new(
            Uuid::nil(),
            (0..n).map(|_| item()).collect(),
            SessionFilters::default(),
            1,
            now,
            Duration::minutes(30),
        )
    }

    fn decide(session: &mut WizardSession, idx: usize) {
        let item_id = session.items[idx].id;
        session.decisions.insert(
            item_id,
            Decision {
                item_id,
                action: DecisionAction::Skip,
                offer: None,
                decided_at: Utc::now(),
            },
        );
    }

    #[test]
    fn state_round_trips_through_str() {
        for state in [
            SessionState::Initialized,
            SessionState::InProgress,
            SessionState::Reviewing,
            SessionState::Completed,
            SessionState::Cancelled,
            SessionState::Expired,
        ] {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
        assert!("paused".parse::<SessionState>().is_err());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let s = session(1);
        assert!(!s.has_lapsed(s.expires_at - Duration::seconds(1)));
        assert!(s.has_lapsed(s.expires_at));
    }

    #[test]
    fn terminal_sessions_never_lapse() {
        let mut s = session(1);
        s.state = SessionState::Completed;
        assert!(!s.has_lapsed(s.expires_at + Duration::days(1)));
    }

    #[test]
    fn advance_wraps_to_earlier_undecided_items() {
        let mut s = session(3);
        s.current_index = 1;
        decide(&mut s, 1);
        decide(&mut s, 2);
        s.advance();
        assert_eq!(s.current_index, 0);

        decide(&mut s, 0);
        s.settle_progress();
        assert_eq!(s.current_index, 3);
        assert!(s.current_item().is_none());
        assert_eq!(s.state, SessionState::Reviewing);
    }

    #[test]
    fn no_candidates_reason_distinguishes_filtering() {
        let empty = ItemSuggestions {
            candidates: Vec::new(),
            found: 0,
        };
        assert_eq!(empty.no_candidates_reason(), Some(NoCandidatesReason::NoMatch));
        let filtered = ItemSuggestions {
            candidates: Vec::new(),
            found: 4,
        };
        assert_eq!(
            filtered.no_candidates_reason(),
            Some(NoCandidatesReason::Filtered)
        );
    }
}
