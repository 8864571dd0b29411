//! Configuration for cloudtally
//!
//! Settings live in a YAML file listing the AWS accounts to inventory,
//! where the inventory state is kept and how failed passes are retried.

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable pointing directly at a config file
pub const CONFIG_PATH_ENV: &str = "CLOUDTALLY_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["cloudtally.yaml", ".cloudtally.yaml"];

/// Get the cloudtally config directory, creating it if needed
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("cloudtally");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the config file
///
/// Search order:
/// 1. `CLOUDTALLY_CONFIG_PATH` (direct path)
/// 2. current directory: `cloudtally.yaml`, `.cloudtally.yaml`
/// 3. `~/.config/cloudtally/config.yaml` (global)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("cloudtally").join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// One AWS account to inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub account_id: String,
    /// Named profile from the shared AWS config; default chain when unset
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Families to collect for this account; all of them when unset
    #[serde(default)]
    pub families: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Directory holding `inventory.json`
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Settings {
    /// Parse and validate settings from YAML text
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        let settings: Settings =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, path)
    }

    /// Find the config file and load it
    pub fn load_default() -> Result<Self> {
        let path = find_config_file()?;
        Self::load(&path)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err(ConfigError::Invalid("account name must not be empty".to_string()));
            }
            let id = &account.account_id;
            if id.len() != 12 || !id.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Invalid(format!(
                    "account '{}' has malformed account_id '{}' (expected 12 digits)",
                    account.name, account.account_id
                )));
            }
            if !seen.insert(account.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "account '{}' is defined more than once",
                    account.name
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Configured state directory, or `<config dir>/state`
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_config_dir()?.join("state")),
        }
    }
}
