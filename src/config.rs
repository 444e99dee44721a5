//! Runtime configuration parsed from environment variables.

use std::path::PathBuf;

use crate::document::DEFAULT_STORAGE_KEY;
use crate::persistence::PersistConfig;

/// Variable lookup, `std::env::var` in production and a map in tests.
pub(crate) type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no data directory: set FETCHIT_DATA_DIR")]
    NoDataDir,
    #[error("invalid {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Directory holding the file-backed storage slots.
    pub data_dir: PathBuf,
    pub storage_key: String,
    /// Load sample data when the store starts empty.
    pub seed: bool,
    pub persist: PersistConfig,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `FETCHIT_DATA_DIR`: platform data dir + `/fetchit` when absent
    /// - `FETCHIT_STORAGE_KEY`: default `fetchit-storage`
    /// - `FETCHIT_SEED`: `true` (default) or `false`
    /// - `FETCHIT_PERSIST_RETRIES`: default 3
    /// - `FETCHIT_PERSIST_RETRY_BASE_MS`: default 25
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        let data_dir = match lookup("FETCHIT_DATA_DIR") {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => dirs::data_dir().ok_or(ConfigError::NoDataDir)?.join("fetchit"),
        };

        let storage_key = lookup("FETCHIT_STORAGE_KEY").unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string());
        if storage_key.trim().is_empty() {
            return Err(ConfigError::Invalid { var: "FETCHIT_STORAGE_KEY", value: storage_key });
        }

        let seed = parse_bool("FETCHIT_SEED", lookup("FETCHIT_SEED"), true)?;

        Ok(Self { data_dir, storage_key, seed, persist: PersistConfig::from_lookup(lookup) })
    }
}

/// Parse `key` or fall back to `default` when absent or unparsable.
pub(crate) fn parse_or<T>(lookup: &Lookup<'_>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key).and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

fn parse_bool(var: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
