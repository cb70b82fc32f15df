//! Agent Configuration
//!
//! TOML configuration for the HomeLink agent. A default file is written on
//! first run so users have something to edit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interaction credit settings
    #[serde(default)]
    pub credits: CreditsConfig,

    /// Local storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Conversation sync settings
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Interaction credit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Maximum (and initial) interaction credits
    #[serde(default = "default_max_credits")]
    pub max: u32,
}

/// Local storage settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Engine database path; platform data dir when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Conversation sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Pull backstop timeout in seconds
    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_secs: u64,
}

fn default_max_credits() -> u32 {
    homelink_engine::DEFAULT_MAX_CREDITS
}

fn default_pull_timeout() -> u64 {
    10
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            max: default_max_credits(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pull_timeout_secs: default_pull_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credits: CreditsConfig::default(),
            storage: StorageConfig::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("homelink").join("agent.toml"))
    }

    /// Load the config, writing the defaults on first run
    pub fn load_or_create(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            return Ok(config);
        }

        let config = Config::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir: {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(&config).context("failed to serialize default config")?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write default config: {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_run_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agent.toml");

        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.credits.max, homelink_engine::DEFAULT_MAX_CREDITS);
        assert_eq!(config.sync.pull_timeout_secs, 10);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agent.toml");
        std::fs::write(&path, "[credits]\nmax = 9\n").unwrap();

        let config = Config::load_or_create(&path).unwrap();
        assert_eq!(config.credits.max, 9);
        assert_eq!(config.sync.pull_timeout_secs, 10);
        assert!(config.storage.path.is_none());
    }
}
