use engine_config::{error::ReportError, settings::error::SettingsError};
use engine_core::error::{ContentError, GenerationError, LockError, StoreError};
use engine_runtime::error::{ActorError, CoordinatorError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to open state store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to open lock table: {0}")]
    Lock(#[from] LockError),

    #[error("Failed to open content store: {0}")]
    Content(#[from] ContentError),

    #[error("Generation service client error: {0}")]
    Generation(#[from] GenerationError),

    #[error("{0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Background poller error: {0}")]
    Actor(#[from] ActorError),

    #[error("Failed to write report: {0}")]
    Report(#[from] ReportError),

    #[error("Failed to read targets file: {0}")]
    Targets(#[from] csv::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
