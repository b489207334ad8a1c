use engine_core::error::{ContentError, LockError};
use model::target::{CanonicalKey, PageKind};
use thiserror::Error;

/// Failures inside a single import attempt. Never escapes the gate as an error;
/// it is folded into a failed or contended outcome.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Lock backend error: {0}")]
    Lock(#[from] LockError),

    #[error("Content store error: {0}")]
    Content(#[from] ContentError),
}

/// Why a completed item could not be turned into importable content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    #[error("Malformed {kind} payload: {reason}")]
    Malformed { kind: PageKind, reason: String },

    #[error("Completed item has no payload")]
    MissingPayload,

    #[error("Completed item has no target")]
    MissingTarget,

    #[error("Target resolves to '{derived}' but item claims '{claimed}'")]
    KeyMismatch {
        claimed: CanonicalKey,
        derived: CanonicalKey,
    },
}
