use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid env file: {0}")]
    EnvFile(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// The generation service URL is not configured.
    #[error("Missing generation service URL (set BULKGEN_API_URL)")]
    MissingApiUrl,

    /// The generation service credential is not configured.
    #[error("Missing generation service credential (set BULKGEN_API_KEY)")]
    MissingApiKey,

    #[error("Could not determine a state directory; set BULKGEN_STATE_DIR")]
    NoStateDir,

    #[error("Settings validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}
