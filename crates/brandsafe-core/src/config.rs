use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::ExcludedCategories;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level audit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub fetch: FetchConfig,
    pub source: SourceConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub max_retries: u32,
    pub backoff_secs: u64,
    pub backoff_strategy: BackoffStrategy,
    pub max_backoff_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub excluded_categories: Vec<String>,
    #[serde(default)]
    pub keywords_path: Option<PathBuf>,
}

impl FetchConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ScoringConfig {
    pub fn excluded(&self) -> ExcludedCategories {
        self.excluded_categories.iter().cloned().collect()
    }
}

impl AuditConfig {
    /// Load config: user file (if exists) merged over built-in defaults.
    pub fn load() -> Result<Self, CoreError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            let config: AuditConfig =
                toml::from_str(DEFAULT_CONFIG).map_err(|e| CoreError::Config(e.to_string()))?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Load an explicit file. Keys it leaves out keep their built-in defaults.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let user_str = std::fs::read_to_string(path)?;
        Self::from_toml(&user_str)
    }

    /// Parse TOML text layered over the built-in defaults.
    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        let mut merged: toml::Table =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| CoreError::Config(e.to_string()))?;
        let user: toml::Table =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        merge(&mut merged, user);

        let config: AuditConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the fetcher cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.fetch.batch_size == 0 {
            return Err(CoreError::Config("fetch.batch_size must be at least 1".into()));
        }
        if self.fetch.max_workers == 0 {
            return Err(CoreError::Config("fetch.max_workers must be at least 1".into()));
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "fetch.request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.source.base_url.trim().is_empty() {
            return Err(CoreError::Config("source.base_url is empty".into()));
        }
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", "brandsafe")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

/// Recursively overlay `over` onto `base`; nested tables merge, everything else replaces.
fn merge(base: &mut toml::Table, over: toml::Table) {
    for (key, value) in over {
        match value {
            toml::Value::Table(over_table) => {
                if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                    merge(base_table, over_table);
                } else {
                    base.insert(key, toml::Value::Table(over_table));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}
