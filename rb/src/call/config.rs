//! Call lifecycle configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Call lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallConfig {
    /// Pause after a call ends before the slot accepts the next one
    #[serde(default = "default_cooldown_ms", rename = "cooldown-ms")]
    pub cooldown_ms: u64,

    /// Unanswered calls count as missed after this long (0 = ring forever)
    #[serde(default = "default_ring_timeout_secs", rename = "ring-timeout-secs")]
    pub ring_timeout_secs: u64,

    /// Triggers held while a call is live
    #[serde(default = "default_max_queued", rename = "max-queued")]
    pub max_queued: usize,

    /// Capacity of the command channel
    #[serde(default = "default_channel_buffer", rename = "channel-buffer")]
    pub channel_buffer: usize,
}

fn default_cooldown_ms() -> u64 {
    2000
}

fn default_ring_timeout_secs() -> u64 {
    45
}

fn default_max_queued() -> usize {
    8
}

fn default_channel_buffer() -> usize {
    64
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            ring_timeout_secs: default_ring_timeout_secs(),
            max_queued: default_max_queued(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl CallConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// `None` when ring timeout is disabled
    pub fn ring_timeout(&self) -> Option<Duration> {
        match self.ring_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
