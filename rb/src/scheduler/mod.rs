//! Reminder scheduler
//!
//! Polls the reminder store on a fixed interval, rings every reminder whose
//! `next_trigger` has passed and writes back its next occurrence.

mod config;
mod core;
mod handle;

pub use config::SchedulerConfig;
pub use core::{ReminderScheduler, TickReport};
pub use handle::LoopHandle;
