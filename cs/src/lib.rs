//! CallStore - append-only JSONL record store
//!
//! Persists typed records into one JSONL log per collection. The logs are
//! replayed into an in-memory SQLite index on open, which answers queries
//! over the fields each record chooses to expose.
//! A single process owns a store directory at a time (exclusive file lock).
//!
//! # Architecture
//!
//! ```text
//! store/
//! ├── .lock              # held exclusively while the store is open
//! ├── reminders.jsonl    # {"op":"put",...} / {"op":"delete",...} lines
//! ├── recalls.jsonl
//! └── history.jsonl
//! ```
//!
//! # Example
//!
//! ```ignore
//! use callstore::{Filter, FilterOp, IndexValue, Store};
//!
//! let mut store = Store::open(".callstore")?;
//! store.put(reminder)?;
//! let due: Vec<Reminder> = store.list(&[Filter::new("next_trigger", FilterOp::Le, IndexValue::Int(now))])?;
//! ```

pub mod cli;
pub mod config;
mod record;
mod store;

pub use record::{Filter, FilterOp, IndexValue, Record};
pub use store::{CollectionStats, Store, StoreError, StoreResult};

/// Compact a collection log once it holds this many more lines than live rows
pub const DEFAULT_COMPACT_SLACK: usize = 64;

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
