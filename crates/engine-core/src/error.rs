use crate::retry::RetryDisposition;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("Pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("Failed to encode snapshot: {0}")]
    Encode(String),

    #[error("Failed to decode snapshot: {0}")]
    Decode(String),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Lock backend error: {0}")]
    Backend(String),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
}

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Content store unavailable: {0}")]
    Unavailable(String),

    #[error("Content store rejected artifact '{key}': {message}")]
    Rejected { key: String, message: String },

    #[error("Artifact '{0}' not found")]
    ArtifactNotFound(String),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ContentError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            ContentError::Unavailable(_) | ContentError::Sled(_) => RetryDisposition::Retry,
            ContentError::Rejected { .. }
            | ContentError::ArtifactNotFound(_)
            | ContentError::Serialization(_) => RetryDisposition::Stop,
        }
    }
}

/// Errors raised by the remote generation service client.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Network failure or timeout. The same call can be repeated later.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service is overloaded or temporarily failing (429/5xx).
    #[error("Service unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The credential was rejected. Retrying will not help.
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The request itself was rejected.
    #[error("Request rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Remote job '{0}' not found")]
    JobNotFound(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Client misconfigured: {0}")]
    Configuration(String),
}

impl GenerationError {
    /// Maps an HTTP status and body onto the error taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => GenerationError::Unauthorized { status, message },
            404 => GenerationError::JobNotFound(message),
            408 | 429 | 500..=599 => GenerationError::Unavailable { status, message },
            _ => GenerationError::Validation { status, message },
        }
    }

    pub fn disposition(&self) -> RetryDisposition {
        match self {
            GenerationError::Transport(_) | GenerationError::Unavailable { .. } => {
                RetryDisposition::Retry
            }
            GenerationError::Unauthorized { .. }
            | GenerationError::Validation { .. }
            | GenerationError::JobNotFound(_)
            | GenerationError::Decode(_)
            | GenerationError::Configuration(_) => RetryDisposition::Stop,
        }
    }

    /// Errors that mean the deployment is broken rather than the request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GenerationError::Unauthorized { .. } | GenerationError::Configuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_statuses() {
        assert!(matches!(
            GenerationError::from_status(401, "bad key".into()),
            GenerationError::Unauthorized { .. }
        ));
        assert!(matches!(
            GenerationError::from_status(503, "busy".into()),
            GenerationError::Unavailable { .. }
        ));
        assert!(matches!(
            GenerationError::from_status(422, "bad items".into()),
            GenerationError::Validation { .. }
        ));
    }

    #[test]
    fn only_transient_errors_retry() {
        assert_eq!(
            GenerationError::Transport("timeout".into()).disposition(),
            RetryDisposition::Retry
        );
        assert_eq!(
            GenerationError::from_status(429, "slow down".into()).disposition(),
            RetryDisposition::Retry
        );
        assert_eq!(
            GenerationError::from_status(403, "nope".into()).disposition(),
            RetryDisposition::Stop
        );
        assert!(GenerationError::from_status(403, "nope".into()).is_configuration());
    }
}
