//! Message types for the call actor

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::Reminder;

/// Where a trigger came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// The scheduler found the reminder due
    Schedule,
    /// The recall checker re-attempted a missed call
    Recall,
    /// A user asked for the call right now
    Manual,
}

/// Request to ring for a reminder
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub reminder: Reminder,
    /// 1 for a fresh trigger
    pub attempt: u32,
    pub source: TriggerSource,
}

impl TriggerRequest {
    pub fn scheduled(reminder: Reminder) -> Self {
        Self {
            reminder,
            attempt: 1,
            source: TriggerSource::Schedule,
        }
    }

    pub fn recall(reminder: Reminder, attempt: u32) -> Self {
        Self {
            reminder,
            attempt,
            source: TriggerSource::Recall,
        }
    }

    pub fn manual(reminder: Reminder) -> Self {
        Self {
            reminder,
            attempt: 1,
            source: TriggerSource::Manual,
        }
    }
}

/// What happened to an accepted trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Ringing now
    Started { call_id: String },
    /// Waiting behind the live call (1 = next)
    Queued { position: usize },
    /// Same reminder already live or queued; dropped
    Coalesced,
}

/// State of the single call slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Incoming,
    Active,
    /// Cooling down after a call
    Ended,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Incoming => write!(f, "incoming"),
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Point-in-time view of the call slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub state: CallState,
    pub call_id: Option<String>,
    pub reminder_id: Option<String>,
    pub attempt: Option<u32>,
    pub queued: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: CallState },

    #[error("Call queue is full ({capacity} waiting)")]
    QueueFull { capacity: usize },

    #[error("Signal for call {got} does not match the live call")]
    StaleSignal { got: String },

    #[error("Call actor is not running")]
    ChannelClosed,
}

pub type CallResult<T> = Result<T, CallError>;

/// Commands sent to the call actor
#[derive(Debug)]
pub enum CallCommand {
    Trigger {
        request: TriggerRequest,
        reply: oneshot::Sender<CallResult<TriggerOutcome>>,
    },
    Answer {
        reply: oneshot::Sender<CallResult<()>>,
    },
    Decline {
        reply: oneshot::Sender<CallResult<()>>,
    },
    Hangup {
        reply: oneshot::Sender<CallResult<()>>,
    },
    /// Playback finished; `call_id` guards against late signals from an old call
    SpeechEnded {
        call_id: Option<String>,
        success: bool,
        reply: oneshot::Sender<CallResult<()>>,
    },
    GetState {
        reply: oneshot::Sender<CallSnapshot>,
    },
    Shutdown,
}
