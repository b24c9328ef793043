//! Error taxonomy for the tallying core
//!
//! Every failure surfaces as a stable kind identifier plus a human-readable
//! message. Cryptographic invariant violations (`InvalidCiphertext`,
//! `TallyInconsistent`) are fatal to the session that hit them; storage and
//! compute failures propagate as `Internal` and may be retried.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    // ============ Input Errors ============
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    // ============ State Machine Errors ============
    #[error("operation not permitted in state {state}: {reason}")]
    InvalidState { state: String, reason: String },

    #[error("tallying session already exists for election {0}")]
    SessionExists(Uuid),

    // ============ Duplicate Write Errors ============
    #[error("duplicate trustee: {0}")]
    DuplicateTrustee(String),

    #[error("duplicate ballot: {0}")]
    DuplicateBallot(String),

    // ============ Threshold Errors ============
    #[error("insufficient shares: {provided} provided, {required} required")]
    InsufficientShares { provided: usize, required: usize },

    #[error("insufficient trustees: {completed} completed, {required} required")]
    InsufficientTrustees { completed: u32, required: u32 },

    // ============ Cryptographic Errors ============
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("tally inconsistent: {0}")]
    TallyInconsistent(String),

    // ============ Authorization Errors ============
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    // ============ Lower-Layer Errors ============
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable kind identifier exposed to callers and audit details.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::SessionExists(_) => "session_exists",
            Self::DuplicateTrustee(_) => "duplicate_trustee",
            Self::DuplicateBallot(_) => "duplicate_ballot",
            Self::InsufficientShares { .. } => "insufficient_shares",
            Self::InsufficientTrustees { .. } => "insufficient_trustees",
            Self::InvalidCiphertext(_) => "invalid_ciphertext",
            Self::TallyInconsistent(_) => "tally_inconsistent",
            Self::NotAuthorized(_) => "not_authorized",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the error must transition the enclosing session to `Failed`.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Self::InvalidCiphertext(_) | Self::TallyInconsistent(_)
        )
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_state(state: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
