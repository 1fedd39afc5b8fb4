//! Time zone selection for schedule arithmetic

use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, Local, TimeZone, Utc};

use super::engine::{ScheduleError, compute_next_recurrence, compute_next_trigger};
use crate::domain::Reminder;

/// Most instants a single preview returns
pub const MAX_UPCOMING: usize = 100;

/// Zone reminders' wall-clock times are interpreted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// The host's local zone (DST aware)
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl Zone {
    pub fn next_trigger(&self, reminder: &Reminder, now: i64) -> i64 {
        match self {
            Self::Local => compute_next_trigger(reminder, now, &Local),
            Self::Utc => compute_next_trigger(reminder, now, &Utc),
            Self::Fixed(offset) => compute_next_trigger(reminder, now, offset),
        }
    }

    pub fn next_recurrence(&self, reminder: &Reminder, now: i64) -> Option<i64> {
        match self {
            Self::Local => compute_next_recurrence(reminder, now, &Local),
            Self::Utc => compute_next_recurrence(reminder, now, &Utc),
            Self::Fixed(offset) => compute_next_recurrence(reminder, now, offset),
        }
    }

    /// The next `count` fire instants after `now`, as the scheduler would produce them
    ///
    /// `count` is capped at [`MAX_UPCOMING`].
    pub fn upcoming(&self, reminder: &Reminder, now: i64, count: usize) -> Vec<i64> {
        let count = count.min(MAX_UPCOMING);
        let mut preview = reminder.clone();
        if !preview.active || preview.next_trigger <= now {
            preview.next_trigger = self.next_trigger(&preview, now);
        }

        let mut instants = Vec::with_capacity(count);
        while instants.len() < count {
            let at = preview.next_trigger;
            instants.push(at);
            match self.next_recurrence(&preview, at) {
                Some(next) if next > at => preview.next_trigger = next,
                _ => break,
            }
        }
        instants
    }

    /// Render an instant as "YYYY-MM-DD HH:MM" in this zone
    pub fn format(&self, ms: i64) -> String {
        match self {
            Self::Local => format_in(&Local, ms),
            Self::Utc => format_in(&Utc, ms),
            Self::Fixed(offset) => format_in(offset, ms),
        }
    }
}

fn format_in<Tz>(tz: &Tz, ms: i64) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match tz.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ms.to_string(),
    }
}

/// Parse "+HH:MM", "-HH:MM", "+HHMM" or "+HH"
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    if !rest.is_ascii() {
        return None;
    }
    let (hh, mm) = match rest.len() {
        2 => (rest, "00"),
        4 => (&rest[..2], &rest[2..]),
        5 if rest.as_bytes()[2] == b':' => (&rest[..2], &rest[3..]),
        _ => return None,
    };
    if !hh.bytes().chain(mm.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hh.parse().ok()?;
    let minutes: i32 = mm.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl FromStr for Zone {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Self::Local),
            "utc" | "z" => Ok(Self::Utc),
            _ => parse_offset(trimmed)
                .map(Self::Fixed)
                .ok_or_else(|| ScheduleError::InvalidZone(s.to_string())),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Utc => write!(f, "utc"),
            Self::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}
