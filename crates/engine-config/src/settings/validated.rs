use crate::settings::env::redact;
use engine_processing::batch::BatchSizePolicy;
use std::{fmt, path::PathBuf, time::Duration};

/// Connection details for the remote generation service.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub url: String,
    pub key: String,
    pub timeout: Duration,
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("url", &self.url)
            .field("key", &redact(&self.key))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Immutable, validated configuration for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSettings {
    /// `None` when no generation service is configured; only local commands work then.
    pub api: Option<ApiSettings>,
    pub state_dir: PathBuf,
    pub max_item_attempts: u32,
    pub lock_ttl: Duration,
    pub poll_interval: Duration,
    pub batch_policy: BatchSizePolicy,
}

impl ValidatedSettings {
    /// Sled database holding jobs, pipelines, locks and the local content store.
    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("db")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.state_dir.join("exports")
    }

    pub fn from_builder(builder: ValidatedSettingsBuilder) -> Self {
        Self {
            api: builder.api,
            state_dir: builder.state_dir,
            max_item_attempts: builder.max_item_attempts.unwrap_or(2),
            lock_ttl: builder.lock_ttl.unwrap_or(Duration::from_secs(30)),
            poll_interval: builder.poll_interval.unwrap_or(Duration::from_secs(60)),
            batch_policy: builder.batch_policy.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidatedSettingsBuilder {
    pub api: Option<ApiSettings>,
    pub state_dir: PathBuf,
    pub max_item_attempts: Option<u32>,
    pub lock_ttl: Option<Duration>,
    pub poll_interval: Option<Duration>,
    pub batch_policy: Option<BatchSizePolicy>,
}

impl ValidatedSettingsBuilder {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            ..Default::default()
        }
    }

    pub fn max_item_attempts(mut self, attempts: u32) -> Self {
        self.max_item_attempts = Some(attempts);
        self
    }

    pub fn build(self) -> ValidatedSettings {
        ValidatedSettings::from_builder(self)
    }
}
