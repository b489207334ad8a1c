use engine_core::error::{ContentError, GenerationError, StoreError};
use model::job::JobStatus;
use thiserror::Error;

/// Errors surfaced by the job coordinator and the phase sequencer.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation service error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Content store error: {0}")]
    Content(#[from] ContentError),

    /// The deployment itself is broken (bad credential, missing settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Job '{job_id}' is {status}; cannot {action}")]
    InvalidState {
        job_id: String,
        status: JobStatus,
        action: &'static str,
    },

    #[error("Job '{0}' has no rows")]
    EmptyJob(String),

    #[error("Job '{0}' was never submitted")]
    NotSubmitted(String),
}

impl CoordinatorError {
    /// Submission failures caused by configuration rather than the request.
    pub fn from_submission(err: GenerationError) -> Self {
        if err.is_configuration() {
            CoordinatorError::Configuration(err.to_string())
        } else {
            CoordinatorError::Generation(err)
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, CoordinatorError::Configuration(_))
    }
}

/// Common error type for all actors in the engine.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Mailbox closed")]
    MailboxClosed,

    #[error("Actor internal error: {0}")]
    Internal(String),
}
