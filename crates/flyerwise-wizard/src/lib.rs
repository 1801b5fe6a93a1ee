//! Shopping-list migration wizard.
//!
//! A [`WizardManager`] walks one list's expired items through candidate
//! generation, per-item or bulk decisions, freshness revalidation and a
//! single atomic commit. Storage, search and time are injected as
//! capabilities ([`store`], [`clock`]); [`memory`] provides in-process
//! implementations of all of them.

pub mod clock;
pub mod error;
pub mod filters;
pub mod guard;
pub mod manager;
pub mod memory;
pub mod outcome;
pub mod recorder;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, WizardError};
pub use filters::{BrandStrategy, PriceStrategy, SessionFilters};
pub use manager::{Capabilities, WizardManager};
pub use outcome::{
    BulkAction, BulkDecision, BulkOutcome, BulkScope, CompleteOutcome, DecisionRequest, Progress,
    StaleItem, StaleReason, StaleReport, StartOutcome, SuggestionsOutcome,
};
pub use recorder::{OfferSnapshot, SnapshotRecorder};
pub use session::{
    CompletionRecord, Decision, DecisionAction, ItemSuggestions, NoCandidatesReason,
    SessionState, WizardSession,
};
pub use store::{
    BatchReceipt, CatalogReader, ListOperation, SessionStore, ShoppingListStore, SnapshotStore,
};
