//! Auto-recall configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{MINUTE_MS, SECOND_MS};

/// Shortest gap allowed between a missed call and its recall
pub const MIN_RECALL_INTERVAL_MS: i64 = 30 * SECOND_MS;

/// Backoff used when no intervals are configured
pub const DEFAULT_RECALL_INTERVAL_MINUTES: f64 = 5.0;

/// Auto-recall configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Re-attempt missed calls at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Recalls allowed per reminder (0 = unlimited)
    #[serde(default = "default_max_attempts", rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff per attempt; the last value repeats for later attempts
    #[serde(default = "default_intervals_minutes", rename = "intervals-minutes")]
    pub intervals_minutes: Vec<f64>,

    /// How often the recall checker polls the ledger
    #[serde(default = "default_check_interval_ms", rename = "check-interval-ms")]
    pub check_interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_intervals_minutes() -> Vec<f64> {
    vec![5.0, 10.0, 15.0, 30.0]
}

fn default_check_interval_ms() -> u64 {
    5000
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_attempts: default_max_attempts(),
            intervals_minutes: default_intervals_minutes(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

impl RecallConfig {
    /// Whether declining `attempt` should produce another attempt
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt <= self.max_attempts)
    }

    /// Delay before recalling after `attempt` was missed
    pub fn backoff_for(&self, attempt: u32) -> i64 {
        let minutes = match self.intervals_minutes.len() {
            0 => DEFAULT_RECALL_INTERVAL_MINUTES,
            len => {
                let index = (attempt.max(1) as usize - 1).min(len - 1);
                self.intervals_minutes[index]
            }
        };
        // NaN and negative values collapse to the floor
        let delay = (minutes * MINUTE_MS as f64) as i64;
        delay.max(MIN_RECALL_INTERVAL_MS)
    }

    /// Get the check interval as a Duration
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}
