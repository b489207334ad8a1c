use crate::settings::error::SettingsError;
use std::{collections::HashMap, fs, path::Path};
use tracing::debug;

pub const ENV_API_URL: &str = "BULKGEN_API_URL";
pub const ENV_API_KEY: &str = "BULKGEN_API_KEY";
pub const ENV_STATE_DIR: &str = "BULKGEN_STATE_DIR";
pub const ENV_TIMEOUT_SECS: &str = "BULKGEN_TIMEOUT_SECS";

const SENSITIVE_PATTERNS: [&str; 6] = ["key", "secret", "token", "password", "auth", "credential"];

/// Environment variables, optionally merged with a `.env` file.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Adds variables from a `KEY=VALUE` file. Variables already set take precedence.
    pub fn load_dotenv<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_env_content(&content)
    }

    /// Non-blank value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), SettingsError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(SettingsError::EnvFile(format!(
                    "malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };
            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() {
                return Err(SettingsError::EnvFile(format!(
                    "empty key at line {}",
                    line_num + 1
                )));
            }

            if self.vars.contains_key(key) {
                debug!(key, "Env file value ignored, already set");
                continue;
            }
            let value = unquote(value);
            if is_sensitive(key) {
                debug!(key, value = %redact(&value), "Loaded from env file");
            } else {
                debug!(key, value = %value, "Loaded from env file");
            }
            self.vars.insert(key.to_string(), value);
        }
        Ok(())
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

pub fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| key.contains(p))
}

/// Keeps the last four characters of a secret for recognition.
pub fn redact(secret: &str) -> String {
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{visible}")
    }
}
