//! LeadLoop configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadLoopConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl Default for LeadLoopConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            scheduler: SchedulerConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl LeadLoopConfig {
    /// Load config from the default path (~/.leadloop/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::LeadLoopError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::LeadLoopError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::LeadLoopError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the LeadLoop home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leadloop")
    }
}

/// Agent registry (database) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the registry database. Defaults to ~/.leadloop/registry.db.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    LeadLoopConfig::home_dir()
        .join("registry.db")
        .to_string_lossy()
        .to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Scheduler policy configuration. All values are policy choices and can be
/// tuned per deployment without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// Max dispatch attempts per scheduled slot before the slot is abandoned.
    #[serde(default = "default_max_retries")]
    pub max_retries_per_slot: u32,
    /// Per-dispatch timeout in seconds. A dispatch exceeding this counts as failed.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    /// Seconds to wait for in-flight dispatches during shutdown.
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_poll_secs() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_dispatch_timeout() -> u64 { 300 }
fn default_grace_secs() -> u64 { 10 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            max_retries_per_slot: default_max_retries(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            shutdown_grace_secs: default_grace_secs(),
        }
    }
}

/// Executor boundary configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutorConfig {
    /// Webhook URL for the external agent runtime. When empty, `leadloop serve`
    /// falls back to a log-only executor.
    #[serde(default)]
    pub webhook_url: String,
    /// Optional bearer token sent with webhook dispatches.
    #[serde(default)]
    pub auth_token: String,
}
