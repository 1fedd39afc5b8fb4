//! Ringback - reminders that behave like phone calls
//!
//! A reminder rings at its scheduled time. Answering it reads the reminder
//! out; declining it (or letting it ring out) books a recall with a growing
//! backoff until the attempt budget is spent.
//!
//! # Core Concepts
//!
//! - **Recurrence**: wall-clock schedules (`HH:MM` plus a repeat rule) turned
//!   into strictly-future instants in a configured time zone
//! - **Single call slot**: one call at a time, owned by an actor task
//! - **Auto-recall**: missed calls leave a ledger row the checker re-rings
//!
//! # Modules
//!
//! - [`domain`] - Reminders, call history and pending recalls
//! - [`recurrence`] - Next-trigger arithmetic
//! - [`store`] - Storage traits and the callstore-backed actor
//! - [`call`] - Call lifecycle state machine
//! - [`recall`] - Recall ledger and checker loop
//! - [`scheduler`] - Reminder polling loop
//! - [`runtime`] - Wiring for a running engine
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod call;
pub mod cli;
pub mod config;
pub mod console;
pub mod domain;
pub mod recall;
pub mod recurrence;
pub mod runtime;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use call::{CallError, CallEvent, CallHandle, CallManager, CallState, EventBus, TriggerRequest};
pub use config::Config;
pub use domain::{CallHistoryEntry, PendingRecall, Reminder, Repeat};
pub use recall::{RecallChecker, RecallConfig, RecallLedger};
pub use recurrence::{Zone, compute_next_recurrence, compute_next_trigger};
pub use runtime::Runtime;
pub use scheduler::{ReminderScheduler, SchedulerConfig, TickReport};
pub use store::{MemoryStore, StateError, StoreManager, Stores};
