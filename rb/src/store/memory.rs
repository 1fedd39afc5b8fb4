//! In-memory store
//!
//! Used by tests and by `ringback run --ephemeral`. Can be switched into a
//! failing mode to exercise storage-outage paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::messages::{StateError, StateResponse};
use super::traits::{HistoryStore, RecallStore, ReminderStore};
use crate::domain::{CallHistoryEntry, PendingRecall, Reminder};

#[derive(Default)]
struct Tables {
    reminders: BTreeMap<String, Reminder>,
    recalls: BTreeMap<String, PendingRecall>,
    history: HashMap<String, CallHistoryEntry>,
}

/// Cloneable in-memory implementation of every store trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        debug!(unavailable, "MemoryStore::set_unavailable: called");
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn tables(&self) -> StateResponse<MutexGuard<'_, Tables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StateError::StoreError("store unavailable".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StateError::StoreError("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn list_reminders(&self) -> StateResponse<Vec<Reminder>> {
        Ok(self.tables()?.reminders.values().cloned().collect())
    }

    async fn get_reminder(&self, id: &str) -> StateResponse<Option<Reminder>> {
        Ok(self.tables()?.reminders.get(id).cloned())
    }

    async fn put_reminder(&self, reminder: Reminder) -> StateResponse<()> {
        self.tables()?.reminders.insert(reminder.id.clone(), reminder);
        Ok(())
    }

    async fn delete_reminder(&self, id: &str) -> StateResponse<bool> {
        Ok(self.tables()?.reminders.remove(id).is_some())
    }
}

#[async_trait]
impl RecallStore for MemoryStore {
    async fn list_recalls(&self) -> StateResponse<Vec<PendingRecall>> {
        Ok(self.tables()?.recalls.values().cloned().collect())
    }

    async fn get_recall(&self, reminder_id: &str) -> StateResponse<Option<PendingRecall>> {
        Ok(self.tables()?.recalls.get(reminder_id).cloned())
    }

    async fn put_recall(&self, recall: PendingRecall) -> StateResponse<()> {
        self.tables()?.recalls.insert(recall.reminder_id.clone(), recall);
        Ok(())
    }

    async fn delete_recall(&self, reminder_id: &str) -> StateResponse<bool> {
        Ok(self.tables()?.recalls.remove(reminder_id).is_some())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn add_history(&self, entry: CallHistoryEntry) -> StateResponse<()> {
        let mut tables = self.tables()?;
        if tables.history.contains_key(&entry.id) {
            return Err(StateError::StoreError(format!("history entry {} already exists", entry.id)));
        }
        tables.history.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn update_history(&self, entry: CallHistoryEntry) -> StateResponse<()> {
        let mut tables = self.tables()?;
        match tables.history.get_mut(&entry.id) {
            Some(existing) => {
                *existing = entry;
                Ok(())
            }
            None => Err(StateError::NotFound(format!("history/{}", entry.id))),
        }
    }

    async fn get_history(&self, id: &str) -> StateResponse<Option<CallHistoryEntry>> {
        Ok(self.tables()?.history.get(id).cloned())
    }

    async fn list_history(&self, reminder_id: Option<&str>) -> StateResponse<Vec<CallHistoryEntry>> {
        let mut entries: Vec<CallHistoryEntry> = self
            .tables()?
            .history
            .values()
            .filter(|entry| reminder_id.is_none_or(|id| entry.reminder_id == id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.triggered_at.cmp(&b.triggered_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }
}
