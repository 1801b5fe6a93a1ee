//! Request and result types of the wizard operations.
//!
//! `NoCandidates` and `StaleData` are outcomes callers branch on, so they
//! are values here rather than [`crate::WizardError`] variants.

use chrono::{DateTime, Utc};
use flyerwise_core::ListItem;
use flyerwise_matching::CandidateSuggestion;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{
    CompletionRecord, DecisionAction, NoCandidatesReason, SessionState, WizardSession,
};

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub session: WizardSession,
    /// An open session for the list already existed and was returned as is.
    pub resumed: bool,
    /// Free-text items that can never be migrated automatically.
    pub skipped_free_text: Vec<Uuid>,
    /// Items still linked to a live offer.
    pub skipped_live: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SuggestionsOutcome {
    Candidates {
        item: ListItem,
        suggestions: Vec<CandidateSuggestion>,
        stores: Vec<String>,
    },
    NoCandidates {
        item: ListItem,
        reason: NoCandidatesReason,
    },
    /// Every item has a decision; nothing is current.
    AllDecided,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub item_id: Uuid,
    pub action: DecisionAction,
    /// Required for `replace`, rejected otherwise.
    #[serde(default)]
    pub offer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Keep,
    Remove,
    Skip,
    /// Replace with the best suggestion inside the selected stores.
    AcceptTop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BulkScope {
    AllUndecided,
    Items { item_ids: Vec<Uuid> },
    Brand { name: String },
    Category { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDecision {
    pub action: BulkAction,
    pub scope: BulkScope,
}

/// Where a session stands after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub session_id: Uuid,
    pub state: SessionState,
    pub decided: usize,
    pub total: usize,
    pub next_item_id: Option<Uuid>,
}

impl From<&WizardSession> for Progress {
    fn from(session: &WizardSession) -> Self {
        Self {
            session_id: session.id,
            state: session.state,
            decided: session.decisions.len(),
            total: session.items.len(),
            next_item_id: session.current_item().map(|item| item.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub applied: Vec<Uuid>,
    /// In scope but left undecided (no suggestion to accept).
    pub left_undecided: Vec<Uuid>,
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaleReason {
    /// The offer is gone from the catalog.
    Missing,
    PriceChanged { was: Decimal, now: Decimal },
    OutsideValidity {
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleItem {
    pub item_id: Uuid,
    pub offer_id: Uuid,
    pub reason: StaleReason,
}

/// Returned instead of committing when the catalog moved on. The listed
/// items lost their decision and must be decided again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleReport {
    pub session_id: Uuid,
    pub session_version: i64,
    pub live_version: i64,
    pub items: Vec<StaleItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompleteOutcome {
    Completed {
        record: CompletionRecord,
        /// Served from the stored result of an earlier call with the same key.
        replayed: bool,
    },
    StaleData(StaleReport),
}
