use crate::settings::{
    Settings,
    error::SettingsError,
    validated::{ApiSettings, ValidatedSettings, ValidatedSettingsBuilder},
};
use engine_processing::batch::BatchSizePolicy;
use reqwest::Url;
use std::{path::PathBuf, time::Duration};
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Turns loosely typed [`Settings`] into [`ValidatedSettings`], collecting every problem.
pub struct SettingsValidator {
    default_state_dir: Option<PathBuf>,
}

impl Default for SettingsValidator {
    fn default() -> Self {
        Self::new(dirs::home_dir().map(|home| home.join(".bulkgen")))
    }
}

impl SettingsValidator {
    pub fn new(default_state_dir: Option<PathBuf>) -> Self {
        Self { default_state_dir }
    }

    pub fn default_config_path(&self) -> Option<PathBuf> {
        self.default_state_dir
            .as_ref()
            .map(|dir| dir.join(crate::settings::CONFIG_FILE_NAME))
    }

    pub fn validate(&self, settings: &Settings) -> Result<ValidatedSettings, SettingsError> {
        let state_dir = settings
            .state_dir
            .clone()
            .or_else(|| self.default_state_dir.clone())
            .ok_or(SettingsError::NoStateDir)?;

        let mut builder = ValidatedSettingsBuilder::new(state_dir);
        let mut errors: Vec<String> = Vec::new();

        self.validate_api(settings, &mut builder, &mut errors)?;
        self.validate_limits(settings, &mut builder, &mut errors);
        self.validate_batch(settings, &mut builder, &mut errors);

        if !errors.is_empty() {
            return Err(SettingsError::ValidationFailed(errors));
        }

        let validated = builder.build();
        info!(
            state_dir = %validated.state_dir.display(),
            api_configured = validated.api.is_some(),
            "Settings loaded"
        );
        Ok(validated)
    }

    fn validate_api(
        &self,
        settings: &Settings,
        builder: &mut ValidatedSettingsBuilder,
        errors: &mut Vec<String>,
    ) -> Result<(), SettingsError> {
        let url = settings.api_url.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let key = settings.api_key.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let (url, key) = match (url, key) {
            (None, None) => {
                warn!("No generation service configured; remote commands will fail");
                return Ok(());
            }
            (None, Some(_)) => return Err(SettingsError::MissingApiUrl),
            (Some(_), None) => return Err(SettingsError::MissingApiKey),
            (Some(url), Some(key)) => (url, key),
        };

        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => errors.push(format!(
                "api_url must use http or https, got '{}'",
                parsed.scheme()
            )),
            Err(e) => errors.push(format!("api_url '{url}' is not a valid URL: {e}")),
        }

        let timeout_secs = settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            errors.push("timeout_secs must be greater than zero".to_string());
        }

        builder.api = Some(ApiSettings {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        });
        Ok(())
    }

    fn validate_limits(
        &self,
        settings: &Settings,
        builder: &mut ValidatedSettingsBuilder,
        errors: &mut Vec<String>,
    ) {
        if let Some(attempts) = settings.max_item_attempts {
            if attempts == 0 {
                errors.push("max_item_attempts must be at least 1".to_string());
            }
            builder.max_item_attempts = Some(attempts);
        }

        if let Some(ttl) = settings.lock_ttl_secs {
            if ttl == 0 {
                errors.push("lock_ttl_secs must be greater than zero".to_string());
            }
            builder.lock_ttl = Some(Duration::from_secs(ttl));
        }

        if let Some(interval) = settings.poll_interval_secs {
            if interval == 0 {
                errors.push("poll_interval_secs must be greater than zero".to_string());
            }
            builder.poll_interval = Some(Duration::from_secs(interval));
        }
    }

    fn validate_batch(
        &self,
        settings: &Settings,
        builder: &mut ValidatedSettingsBuilder,
        errors: &mut Vec<String>,
    ) {
        let Some(batch) = &settings.batch else {
            return;
        };

        let policy = BatchSizePolicy {
            base: batch.base,
            catch_up: batch.catch_up,
            drain: batch.drain,
            catch_up_lag: batch.catch_up_lag,
            drain_lag: batch.drain_lag,
        };

        if policy.base == 0 {
            errors.push("batch.base must be greater than zero".to_string());
        }
        if !(policy.base <= policy.catch_up && policy.catch_up <= policy.drain) {
            errors.push("batch sizes must satisfy base <= catch_up <= drain".to_string());
        }
        if policy.catch_up_lag >= policy.drain_lag {
            errors.push("batch.catch_up_lag must be below batch.drain_lag".to_string());
        }
        if policy.drain > 500 {
            warn!(drain = policy.drain, "Very large drain batch size");
        }

        builder.batch_policy = Some(policy);
    }
}
