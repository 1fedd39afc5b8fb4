//! Domain types for Ringback
//!
//! Reminder, CallHistoryEntry and PendingRecall all implement the callstore
//! `Record` trait so they can live in the JSONL store.

mod history;
mod id;
mod recall;
mod reminder;

pub use history::{CallHistoryEntry, CallOutcome, HistoryError};
pub use id::{generate_entry_id, generate_id, resolve_id};
pub use recall::PendingRecall;
pub use reminder::{CustomRepeat, DAY_MS, HOUR_MS, MINUTE_MS, Reminder, Repeat, SECOND_MS, WEEK_MS};

// Re-export callstore types for convenience
pub use callstore::{Filter, FilterOp, IndexValue, Record};
