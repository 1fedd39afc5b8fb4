//! Store manager messages
//!
//! Commands and responses for the actor pattern.

use callstore::StoreError;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{CallHistoryEntry, PendingRecall, Reminder};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

impl From<StoreError> for StateError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => Self::NotFound(format!("{}/{}", collection, id)),
            other => Self::StoreError(other.to_string()),
        }
    }
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

type Reply<T> = oneshot::Sender<StateResponse<T>>;

/// Commands sent to the StoreManager actor
#[derive(Debug)]
pub enum StoreCommand {
    // Reminder operations
    ListReminders {
        reply: Reply<Vec<Reminder>>,
    },
    GetReminder {
        id: String,
        reply: Reply<Option<Reminder>>,
    },
    PutReminder {
        reminder: Reminder,
        reply: Reply<()>,
    },
    DeleteReminder {
        id: String,
        reply: Reply<bool>,
    },

    // Recall ledger operations
    ListRecalls {
        reply: Reply<Vec<PendingRecall>>,
    },
    GetRecall {
        reminder_id: String,
        reply: Reply<Option<PendingRecall>>,
    },
    PutRecall {
        recall: PendingRecall,
        reply: Reply<()>,
    },
    DeleteRecall {
        reminder_id: String,
        reply: Reply<bool>,
    },
    DueRecalls {
        now: i64,
        reply: Reply<Vec<PendingRecall>>,
    },

    // History operations
    AddHistory {
        entry: CallHistoryEntry,
        reply: Reply<()>,
    },
    UpdateHistory {
        entry: CallHistoryEntry,
        reply: Reply<()>,
    },
    GetHistory {
        id: String,
        reply: Reply<Option<CallHistoryEntry>>,
    },
    ListHistory {
        reminder_id: Option<String>,
        reply: Reply<Vec<CallHistoryEntry>>,
    },

    // Shutdown
    Shutdown,
}
