//! CallHistoryEntry domain type
//!
//! One entry per call attempt. The title and reason are copied at trigger time
//! so the history survives edits to (or deletion of) the reminder.

use std::collections::HashMap;

use callstore::{IndexValue, Record};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::id::generate_entry_id;
use super::reminder::Reminder;

/// Rejected mutation of a history entry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("History entry {0} has already ended")]
    AlreadyEnded(String),

    #[error("History entry {0} was already answered")]
    AlreadyAnswered(String),
}

/// User-facing summary of how an attempt went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Still in progress
    Ringing,
    Answered,
    /// Ended without being answered
    Missed,
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ringing => write!(f, "ringing"),
            Self::Answered => write!(f, "answered"),
            Self::Missed => write!(f, "missed"),
        }
    }
}

/// Record of a single call attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHistoryEntry {
    pub id: String,
    pub reminder_id: String,
    pub title: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub triggered_at: i64,
    pub answered: bool,
    #[serde(default)]
    pub answered_at: Option<i64>,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub voice_played: bool,
    #[serde(default)]
    pub voice_played_successfully: bool,
    /// 1 for the original trigger, N for the (N-1)th recall
    pub attempt: u32,
}

impl CallHistoryEntry {
    /// Start a new entry for a reminder that just started ringing
    pub fn start(reminder: &Reminder, attempt: u32, triggered_at: i64) -> Self {
        debug!(reminder_id = %reminder.id, attempt, triggered_at, "CallHistoryEntry::start: called");
        Self {
            id: generate_entry_id(),
            reminder_id: reminder.id.clone(),
            title: reminder.title.clone(),
            reason: reminder.reason.clone(),
            triggered_at,
            answered: false,
            answered_at: None,
            ended_at: None,
            duration_ms: None,
            voice_played: false,
            voice_played_successfully: false,
            attempt: attempt.max(1),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    fn ensure_open(&self) -> Result<(), HistoryError> {
        if self.is_ended() {
            debug!(id = %self.id, "ensure_open: entry already ended");
            return Err(HistoryError::AlreadyEnded(self.id.clone()));
        }
        Ok(())
    }

    /// Mark the call as picked up
    pub fn mark_answered(&mut self, at: i64) -> Result<(), HistoryError> {
        debug!(id = %self.id, at, "mark_answered: called");
        self.ensure_open()?;
        if self.answered {
            return Err(HistoryError::AlreadyAnswered(self.id.clone()));
        }
        self.answered = true;
        self.answered_at = Some(at);
        Ok(())
    }

    /// Record whether a voice was played and whether playback succeeded
    pub fn record_playback(&mut self, played: bool, success: bool) -> Result<(), HistoryError> {
        debug!(id = %self.id, played, success, "record_playback: called");
        self.ensure_open()?;
        self.voice_played = played;
        self.voice_played_successfully = played && success;
        Ok(())
    }

    /// Close the entry
    ///
    /// Answered calls last from pickup to `at`; unanswered calls last zero.
    pub fn mark_ended(&mut self, at: i64) -> Result<(), HistoryError> {
        debug!(id = %self.id, at, "mark_ended: called");
        self.ensure_open()?;
        let duration = match self.answered_at {
            Some(answered_at) => (at - answered_at).max(0),
            None => 0,
        };
        self.ended_at = Some(at);
        self.duration_ms = Some(duration);
        Ok(())
    }

    pub fn outcome(&self) -> CallOutcome {
        if self.answered {
            CallOutcome::Answered
        } else if self.is_ended() {
            CallOutcome::Missed
        } else {
            CallOutcome::Ringing
        }
    }
}

impl Record for CallHistoryEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.ended_at.or(self.answered_at).unwrap_or(self.triggered_at)
    }

    fn collection_name() -> &'static str {
        "history"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("reminder_id".to_string(), IndexValue::String(self.reminder_id.clone()));
        fields.insert("triggered_at".to_string(), IndexValue::Int(self.triggered_at));
        fields
    }
}
