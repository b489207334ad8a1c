use crate::settings::{
    env::{ENV_API_KEY, ENV_API_URL, ENV_STATE_DIR, ENV_TIMEOUT_SECS, EnvSource},
    error::SettingsError,
    validated::ValidatedSettings,
    validator::SettingsValidator,
};
use engine_processing::batch::BatchSizePolicy;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use tracing::debug;

pub mod env;
pub mod error;
pub mod validated;
pub mod validator;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Settings as written in `config.json`. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub max_item_attempts: Option<u32>,
    pub lock_ttl_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub batch: Option<BatchSettings>,
}

/// Batch-size thresholds; omitted fields keep their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BatchSettings {
    pub base: usize,
    pub catch_up: usize,
    pub drain: usize,
    pub catch_up_lag: u64,
    pub drain_lag: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        let policy = BatchSizePolicy::default();
        Self {
            base: policy.base,
            catch_up: policy.catch_up,
            drain: policy.drain,
            catch_up_lag: policy.catch_up_lag,
            drain_lag: policy.drain_lag,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Environment variables override file values.
    pub fn apply_env(&mut self, env: &EnvSource) -> Result<(), SettingsError> {
        if let Some(url) = env.get(ENV_API_URL) {
            self.api_url = Some(url.to_string());
        }
        if let Some(key) = env.get(ENV_API_KEY) {
            self.api_key = Some(key.to_string());
        }
        if let Some(dir) = env.get(ENV_STATE_DIR) {
            self.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = env.get(ENV_TIMEOUT_SECS) {
            let secs = raw.parse().map_err(|_| SettingsError::InvalidValue {
                key: ENV_TIMEOUT_SECS.to_string(),
                value: raw.to_string(),
            })?;
            self.timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Reads `config_path` (or `config.json` in the default state directory when
    /// it exists), applies `env` on top and validates the result.
    pub fn load(
        config_path: Option<&Path>,
        env: &EnvSource,
        validator: &SettingsValidator,
    ) -> Result<ValidatedSettings, SettingsError> {
        let mut settings = match config_path {
            Some(path) => Self::from_file(path)?,
            None => match validator.default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env(env)?;
        debug!(api_url = ?settings.api_url, state_dir = ?settings.state_dir, "Resolved settings");
        validator.validate(&settings)
    }
}
