//! Next-fire arithmetic
//!
//! Both entry points are pure: the same reminder, instant and zone always give
//! the same answer. Bad input never surfaces as an error to callers; it is
//! clamped to "fire in a minute" so a schedule can never stop advancing.

use chrono::{Days, NaiveDate, NaiveTime, TimeZone};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{HOUR_MS, MINUTE_MS, Reminder, Repeat};

/// Delay used when a schedule cannot be computed
pub const CLAMP_DELAY_MS: i64 = MINUTE_MS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Invalid time of day: {0:?} (expected HH:MM)")]
    InvalidTime(String),

    #[error("{date} {time} does not exist in this time zone")]
    NonexistentLocalTime { date: NaiveDate, time: NaiveTime },

    #[error("Instant out of range: {0}")]
    OutOfRange(i64),

    #[error("Invalid time zone: {0:?} (expected local, utc or an offset like +02:00)")]
    InvalidZone(String),
}

/// Parse an "HH:MM" time of day
pub fn parse_time_of_day(time: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| ScheduleError::InvalidTime(time.to_string()))
}

/// Smallest `anchor + k * period` (k >= 1) strictly after `now`
///
/// Returns `anchor` unchanged when it is already in the future.
pub fn advance_by(anchor: i64, period: i64, now: i64) -> i64 {
    if period <= 0 || anchor > now {
        return anchor;
    }
    let steps = (now - anchor) / period + 1;
    anchor.saturating_add(steps.saturating_mul(period))
}

fn local_at<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Result<i64, ScheduleError> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or(ScheduleError::NonexistentLocalTime { date, time })
}

/// Same wall-clock time `days` calendar days later
///
/// Falls back to whole 24h steps from `anchor` when that local time is skipped.
fn days_after<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime, days: u64, anchor: i64) -> i64 {
    date.checked_add_days(Days::new(days))
        .and_then(|later| local_at(tz, later, time).ok())
        .unwrap_or_else(|| anchor.saturating_add(days as i64 * crate::domain::DAY_MS))
}

fn try_next_trigger<Tz: TimeZone>(reminder: &Reminder, now: i64, tz: &Tz) -> Result<i64, ScheduleError> {
    let time = parse_time_of_day(&reminder.time)?;
    let today = tz
        .timestamp_millis_opt(now)
        .single()
        .ok_or(ScheduleError::OutOfRange(now))?
        .date_naive();
    let anchor = local_at(tz, today, time)?;
    if anchor > now {
        return Ok(anchor);
    }

    let next = match &reminder.repeat {
        Repeat::Once | Repeat::Daily => days_after(tz, today, time, 1, anchor),
        Repeat::Weekly => days_after(tz, today, time, 7, anchor),
        Repeat::Hourly => advance_by(anchor, HOUR_MS, now),
        Repeat::Custom { .. } => match reminder.repeat.custom_interval_ms() {
            Some(interval) => advance_by(anchor, interval, now),
            None => days_after(tz, today, time, 1, anchor),
        },
    };
    Ok(next)
}

/// Next instant a reminder should fire, strictly after `now`
pub fn compute_next_trigger<Tz: TimeZone>(reminder: &Reminder, now: i64, tz: &Tz) -> i64 {
    debug!(reminder_id = %reminder.id, time = %reminder.time, now, "compute_next_trigger: called");
    match try_next_trigger(reminder, now, tz) {
        Ok(next) if next > now => next,
        Ok(next) => {
            warn!(reminder_id = %reminder.id, next, now, "compute_next_trigger: result not in the future, clamping");
            now + CLAMP_DELAY_MS
        }
        Err(e) => {
            warn!(reminder_id = %reminder.id, error = %e, "compute_next_trigger: clamping malformed schedule");
            now + CLAMP_DELAY_MS
        }
    }
}

/// Occurrence after the one at `reminder.next_trigger`
///
/// `None` means the reminder is one-shot and should go dormant. The period is
/// added to the previous fire so the cadence does not drift; if the process
/// slept through one or more periods the result jumps straight past them.
pub fn compute_next_recurrence<Tz: TimeZone>(reminder: &Reminder, now: i64, tz: &Tz) -> Option<i64> {
    debug!(reminder_id = %reminder.id, next_trigger = reminder.next_trigger, now, "compute_next_recurrence: called");
    let period = reminder.repeat.period_ms()?;
    let next = reminder.next_trigger.saturating_add(period);
    if next > now {
        Some(next)
    } else {
        debug!(reminder_id = %reminder.id, "compute_next_recurrence: fast-forwarding missed occurrences");
        Some(compute_next_trigger(reminder, now, tz))
    }
}
