//! Recurrence engine
//!
//! Turns a reminder's time of day and repeat rule into concrete fire instants.

mod engine;
mod zone;

pub use engine::{
    CLAMP_DELAY_MS, ScheduleError, advance_by, compute_next_recurrence, compute_next_trigger, parse_time_of_day,
};
pub use zone::{MAX_UPCOMING, Zone};
