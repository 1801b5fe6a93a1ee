use flyerwise_matching::{FinderError, SearchError};
use thiserror::Error;
use uuid::Uuid;

use crate::session::SessionState;

/// Failures reported by the capability stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write lost against a concurrent writer.
    #[error("conditional write rejected: record was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("item {item_id} has no product master; manual search required")]
    NoProductMaster { item_id: Uuid },

    /// Transient; the caller may retry with backoff.
    #[error("similarity search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("invalid decision: {reason}")]
    InvalidDecision { reason: String },

    #[error("session is busy with another operation")]
    SessionBusy,

    #[error("session has expired")]
    SessionExpired,

    #[error("session not found")]
    SessionNotFound,

    #[error("session is {state} and can no longer change")]
    SessionTerminal { state: SessionState },

    #[error(transparent)]
    Store(StoreError),
}

impl WizardError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDecision {
            reason: reason.into(),
        }
    }

    /// Error for an operation attempted on a session in a terminal state.
    pub(crate) fn terminal(state: SessionState) -> Self {
        match state {
            SessionState::Expired => Self::SessionExpired,
            state => Self::SessionTerminal { state },
        }
    }

    /// Stable machine-readable code for API envelopes and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoProductMaster { .. } => "no_product_master",
            Self::SearchUnavailable(_) => "search_unavailable",
            Self::InvalidDecision { .. } => "invalid_decision",
            Self::SessionBusy => "session_busy",
            Self::SessionExpired => "session_expired",
            Self::SessionNotFound => "session_not_found",
            Self::SessionTerminal { .. } => "session_terminal",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for WizardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::SessionBusy,
            other => Self::Store(other),
        }
    }
}

impl From<FinderError> for WizardError {
    fn from(err: FinderError) -> Self {
        match err {
            FinderError::NoProductMaster { item_id } => Self::NoProductMaster { item_id },
            FinderError::SearchUnavailable(SearchError::Unavailable(reason)) => {
                Self::SearchUnavailable(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_surfaces_as_busy() {
        assert!(matches!(
            WizardError::from(StoreError::Conflict),
            WizardError::SessionBusy
        ));
        assert!(matches!(
            WizardError::from(StoreError::Backend("down".into())),
            WizardError::Store(StoreError::Backend(_))
        ));
    }

    #[test]
    fn finder_errors_keep_their_meaning() {
        let id = Uuid::new_v4();
        let err = WizardError::from(FinderError::NoProductMaster { item_id: id });
        assert!(matches!(err, WizardError::NoProductMaster { item_id } if item_id == id));

        let err = WizardError::from(FinderError::SearchUnavailable(SearchError::Unavailable(
            "timeout".into(),
        )));
        assert_eq!(err.code(), "search_unavailable");
        assert_eq!(err.to_string(), "similarity search unavailable: timeout");
    }

    #[test]
    fn expired_terminal_state_maps_to_expired_error() {
        assert!(matches!(
            WizardError::terminal(SessionState::Expired),
            WizardError::SessionExpired
        ));
        let err = WizardError::terminal(SessionState::Completed);
        assert_eq!(err.to_string(), "session is completed and can no longer change");
    }
}
