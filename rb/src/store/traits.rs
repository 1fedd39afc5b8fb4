//! Storage seams consumed by the engine
//!
//! The scheduler, recall ledger and call actor only see these traits, so the
//! durable JSONL store and the in-memory store are interchangeable.

use async_trait::async_trait;

use super::messages::StateResponse;
use crate::domain::{CallHistoryEntry, PendingRecall, Reminder};

#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn list_reminders(&self) -> StateResponse<Vec<Reminder>>;

    async fn get_reminder(&self, id: &str) -> StateResponse<Option<Reminder>>;

    /// Insert or replace
    async fn put_reminder(&self, reminder: Reminder) -> StateResponse<()>;

    /// Returns whether the reminder existed
    async fn delete_reminder(&self, id: &str) -> StateResponse<bool>;
}

#[async_trait]
pub trait RecallStore: Send + Sync {
    async fn list_recalls(&self) -> StateResponse<Vec<PendingRecall>>;

    async fn get_recall(&self, reminder_id: &str) -> StateResponse<Option<PendingRecall>>;

    /// Upsert keyed by reminder ID
    async fn put_recall(&self, recall: PendingRecall) -> StateResponse<()>;

    /// Returns whether a recall was pending
    async fn delete_recall(&self, reminder_id: &str) -> StateResponse<bool>;

    /// Recalls due at or before `now`, earliest first
    async fn due_recalls(&self, now: i64) -> StateResponse<Vec<PendingRecall>> {
        let mut due: Vec<PendingRecall> = self
            .list_recalls()
            .await?
            .into_iter()
            .filter(|recall| recall.is_due(now))
            .collect();
        due.sort_by_key(|recall| recall.due_at);
        Ok(due)
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_history(&self, entry: CallHistoryEntry) -> StateResponse<()>;

    /// Replace an existing entry; fails with `NotFound` if it was never added
    async fn update_history(&self, entry: CallHistoryEntry) -> StateResponse<()>;

    async fn get_history(&self, id: &str) -> StateResponse<Option<CallHistoryEntry>>;

    /// Entries oldest first, optionally for one reminder
    async fn list_history(&self, reminder_id: Option<&str>) -> StateResponse<Vec<CallHistoryEntry>>;
}
