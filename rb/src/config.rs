//! Ringback configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::call::CallConfig;
use crate::recall::RecallConfig;
use crate::recurrence::Zone;
use crate::scheduler::SchedulerConfig;

/// Longest ring timeout accepted (one day)
pub const MAX_RING_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Longest post-call cool-down accepted (one hour)
pub const MAX_COOLDOWN_MS: u64 = 60 * 60 * 1000;

/// Longest recall backoff accepted (one week)
pub const MAX_RECALL_INTERVAL_MINUTES: f64 = 7.0 * 24.0 * 60.0;

/// Main Ringback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level when none is given on the command line
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Zone reminder times are read in: "local", "utc" or an offset like "+02:00"
    pub timezone: String,

    /// Reminder scheduler
    pub scheduler: SchedulerConfig,

    /// Auto-recall of missed calls
    pub recall: RecallConfig,

    /// Call lifecycle
    pub call: CallConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            timezone: "local".to_string(),
            scheduler: SchedulerConfig::default(),
            recall: RecallConfig::default(),
            call: CallConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(eyre::eyre!("scheduler.tick-interval-ms must be greater than zero"));
        }
        if self.recall.check_interval_ms == 0 {
            return Err(eyre::eyre!("recall.check-interval-ms must be greater than zero"));
        }
        if let Some(bad) = self
            .recall
            .intervals_minutes
            .iter()
            .find(|m| !m.is_finite() || **m < 0.0 || **m > MAX_RECALL_INTERVAL_MINUTES)
        {
            return Err(eyre::eyre!(
                "recall.intervals-minutes contains an invalid value: {} (allowed 0 to {})",
                bad,
                MAX_RECALL_INTERVAL_MINUTES
            ));
        }
        if self.call.ring_timeout_secs > MAX_RING_TIMEOUT_SECS {
            return Err(eyre::eyre!(
                "call.ring-timeout-secs must be at most {}",
                MAX_RING_TIMEOUT_SECS
            ));
        }
        if self.call.cooldown_ms > MAX_COOLDOWN_MS {
            return Err(eyre::eyre!("call.cooldown-ms must be at most {}", MAX_COOLDOWN_MS));
        }
        self.zone()?;
        Ok(())
    }

    /// Parsed time zone
    pub fn zone(&self) -> Result<Zone> {
        self.timezone
            .parse()
            .context(format!("Invalid timezone '{}'", self.timezone))
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .ringback.yml
        let local_config = PathBuf::from(".ringback.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/ringback/ringback.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ringback").join("ringback.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the call store
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Same directory callstore defaults to (~/.local/share/ringback/store on Linux)
        let path = dirs::data_local_dir()
            .map(|d| d.join("ringback").join("store"))
            .unwrap_or_else(|| PathBuf::from(".ringback-store"))
            .to_string_lossy()
            .into_owned();

        Self { path }
    }
}

impl StorageConfig {
    /// Store directory with a leading `~/` resolved
    pub fn expanded_path(&self) -> PathBuf {
        match self.path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.path)),
            None => PathBuf::from(&self.path),
        }
    }
}
