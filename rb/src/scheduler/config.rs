//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often due reminders are looked for
    #[serde(default = "default_tick_interval_ms", rename = "tick-interval-ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    5000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Get the tick interval as a Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval_ms, 5000);
        assert_eq!(config.tick_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_deserialize() {
        let config: SchedulerConfig = serde_yaml::from_str("tick-interval-ms: 250").unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(250));

        let config: SchedulerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }
}
