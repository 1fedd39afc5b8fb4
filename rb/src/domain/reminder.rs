//! Reminder record and schedule descriptors

use std::collections::HashMap;

use callstore::{IndexValue, Record, now_ms};
use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::id::generate_id;

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;

/// How a reminder repeats after it fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Repeat {
    /// Fire once, then go dormant
    #[default]
    Once,
    Hourly,
    Daily,
    Weekly,
    Custom { rule: CustomRepeat },
}

/// Rule carried by a custom schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomRepeat {
    /// Fixed interval in milliseconds
    Interval { ms: i64 },
    /// Specific times of day ("HH:MM")
    Times { times: Vec<String> },
    /// Specific days of the week
    Weekdays { days: Vec<Weekday> },
}

impl Repeat {
    /// Custom schedule with a fixed interval
    pub fn every(interval_ms: i64) -> Self {
        Self::Custom {
            rule: CustomRepeat::Interval { ms: interval_ms },
        }
    }

    /// Fixed interval of a custom schedule, if it has a usable one
    pub fn custom_interval_ms(&self) -> Option<i64> {
        match self {
            Self::Custom {
                rule: CustomRepeat::Interval { ms },
            } if *ms > 0 => Some(*ms),
            _ => None,
        }
    }

    /// Period between consecutive fires, `None` for one-shot schedules
    ///
    /// Custom schedules without a fixed interval repeat daily.
    pub fn period_ms(&self) -> Option<i64> {
        match self {
            Self::Once => None,
            Self::Hourly => Some(HOUR_MS),
            Self::Daily => Some(DAY_MS),
            Self::Weekly => Some(WEEK_MS),
            Self::Custom { .. } => Some(self.custom_interval_ms().unwrap_or(DAY_MS)),
        }
    }

    pub fn is_once(&self) -> bool {
        matches!(self, Self::Once)
    }
}

impl std::fmt::Display for Repeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once => write!(f, "once"),
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Custom { rule } => match rule {
                CustomRepeat::Interval { ms } if *ms >= HOUR_MS && ms % HOUR_MS == 0 => {
                    write!(f, "every {} hours", ms / HOUR_MS)
                }
                CustomRepeat::Interval { ms } => write!(f, "every {} minutes", ms / MINUTE_MS),
                CustomRepeat::Times { times } => write!(f, "at {}", times.join(", ")),
                CustomRepeat::Weekdays { days } => {
                    let days: Vec<String> = days.iter().map(|d| d.to_string()).collect();
                    write!(f, "on {}", days.join(", "))
                }
            },
        }
    }
}

/// A reminder the user wants to be called about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Unique identifier
    pub id: String,

    /// What to remind about
    pub title: String,

    /// Why it matters (spoken after the title)
    #[serde(default)]
    pub reason: Option<String>,

    /// Time of day, "HH:MM"
    pub time: String,

    /// Recurrence rule
    #[serde(default)]
    pub repeat: Repeat,

    /// Dormant reminders are never due
    pub active: bool,

    /// Next fire instant (Unix milliseconds)
    pub next_trigger: i64,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    #[serde(default)]
    pub updated_at: i64,

    /// Pre-recorded audio to play instead of synthesized speech
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_audio: Option<Vec<u8>>,

    /// Prefer `custom_audio` over speech when both are available
    #[serde(default)]
    pub use_custom_audio: bool,
}

impl Reminder {
    /// Create a new active reminder with a generated ID
    ///
    /// `next_trigger` starts at 0; callers schedule it with the recurrence engine.
    pub fn new(title: impl Into<String>, time: impl Into<String>, repeat: Repeat) -> Self {
        let title = title.into();
        let now = now_ms();
        Self {
            id: generate_id(&title),
            title,
            reason: None,
            time: time.into(),
            repeat,
            active: true,
            next_trigger: 0,
            created_at: now,
            updated_at: now,
            custom_audio: None,
            use_custom_audio: false,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_custom_audio(mut self, audio: Vec<u8>) -> Self {
        self.custom_audio = Some(audio);
        self.use_custom_audio = true;
        self
    }

    pub fn with_next_trigger(mut self, next_trigger: i64) -> Self {
        self.next_trigger = next_trigger;
        self
    }

    /// Active and scheduled at or before `now`
    pub fn is_due(&self, now: i64) -> bool {
        self.active && self.next_trigger <= now
    }

    /// Custom audio payload, when present and selected
    pub fn selected_audio(&self) -> Option<&[u8]> {
        if self.use_custom_audio {
            self.custom_audio.as_deref().filter(|audio| !audio.is_empty())
        } else {
            None
        }
    }

    /// Text read out when the call is answered
    pub fn speech_text(&self) -> String {
        match self.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("Reminder: {}. {}", self.title, reason),
            None => format!("Reminder: {}.", self.title),
        }
    }

    /// Move to a new fire instant
    pub fn reschedule(&mut self, next_trigger: i64) {
        self.next_trigger = next_trigger;
        self.updated_at = now_ms();
    }

    /// Go dormant
    pub fn deactivate(&mut self) {
        self.active = false;
        self.updated_at = now_ms();
    }
}

impl Record for Reminder {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "reminders"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("next_trigger".to_string(), IndexValue::Int(self.next_trigger));
        fields.insert("active".to_string(), IndexValue::Bool(self.active));
        fields
    }
}
