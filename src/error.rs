//! Domain error types

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by edit orchestration and the event/proposal store.
///
/// Only these abort a request. Everything non-fatal (estimated travel,
/// degraded sequencing, missing lunch) is an `Advisory` on the snapshot.
#[derive(Debug, Error)]
pub enum EditError {
    /// Rejected before recomputation; the proposal is left unchanged.
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(Uuid),

    #[error("Event {0} has no proposal labels left")]
    TooManyProposals(Uuid),

    /// Contract violation: the event invariant should make this impossible.
    #[error("Pricing inconsistency: {0}")]
    Pricing(#[from] PricingError),
}

impl EditError {
    pub fn invalid(message: impl Into<String>) -> Self {
        EditError::InvalidEdit(message.into())
    }

    /// Error code used in `ErrorResponse`
    pub const fn code(&self) -> &'static str {
        match self {
            EditError::InvalidEdit(_) => "INVALID_EDIT",
            EditError::InvalidEvent(_) => "INVALID_EVENT",
            EditError::EventNotFound(_) | EditError::ProposalNotFound(_) => "NOT_FOUND",
            EditError::TooManyProposals(_) => "LIMIT_REACHED",
            EditError::Pricing(_) => "PRICING_INCONSISTENCY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("per-person price is undefined for group size {group_size}")]
    DivisionUndefined { group_size: i64 },

    #[error("amount for '{item}' does not fit in the money range")]
    Overflow { item: String },
}

/// Failures converting a persisted record back into a proposal
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid start time '{0}'")]
    InvalidStartTime(String),

    #[error("anchor {0} does not reference a stop")]
    DanglingAnchor(Uuid),

    #[error("override for unknown item {0}")]
    DanglingOverride(Uuid),

    #[error("duplicate id {0}")]
    DuplicateId(Uuid),

    /// A field an edit would have refused
    #[error("{0}")]
    Rejected(#[source] EditError),
}
