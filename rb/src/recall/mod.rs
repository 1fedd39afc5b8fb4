//! Auto-recall
//!
//! A missed call leaves a `PendingRecall` in the ledger; the checker rings
//! again once it falls due, one attempt number higher.

mod checker;
mod config;
mod ledger;

pub use checker::{CheckReport, RecallChecker};
pub use config::{DEFAULT_RECALL_INTERVAL_MINUTES, MIN_RECALL_INTERVAL_MS, RecallConfig};
pub use ledger::RecallLedger;
