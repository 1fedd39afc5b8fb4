//! PendingRecall domain type

use std::collections::HashMap;

use callstore::{IndexValue, Record, now_ms};
use serde::{Deserialize, Serialize};

use super::reminder::Reminder;

/// A scheduled re-attempt of a missed reminder
///
/// Keyed by reminder ID, so a reminder has at most one pending recall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecall {
    pub reminder_id: String,

    /// Reminder as it was when the call was missed
    pub reminder: Reminder,

    /// Attempt number the recall will ring with
    pub attempt: u32,

    /// When to ring again (Unix milliseconds)
    pub due_at: i64,

    /// History entry of the missed attempt
    pub history_id: String,

    #[serde(default)]
    pub created_at: i64,
}

impl PendingRecall {
    pub fn new(reminder: Reminder, attempt: u32, due_at: i64, history_id: impl Into<String>) -> Self {
        Self {
            reminder_id: reminder.id.clone(),
            reminder,
            attempt,
            due_at,
            history_id: history_id.into(),
            created_at: now_ms(),
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.due_at <= now
    }
}

impl Record for PendingRecall {
    fn id(&self) -> &str {
        &self.reminder_id
    }

    fn updated_at(&self) -> i64 {
        self.created_at
    }

    fn collection_name() -> &'static str {
        "recalls"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("due_at".to_string(), IndexValue::Int(self.due_at));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Repeat;

    #[test]
    fn test_keyed_by_reminder() {
        let reminder = Reminder::new("Call back", "12:00", Repeat::Once);
        let recall = PendingRecall::new(reminder.clone(), 2, 5_000, "hist-1");
        assert_eq!(Record::id(&recall), reminder.id);
        assert_eq!(recall.attempt, 2);
        assert!(recall.is_due(5_000));
        assert!(!recall.is_due(4_999));
        assert_eq!(recall.indexed_fields().get("due_at"), Some(&IndexValue::Int(5_000)));
    }
}
