//! StoreManager - actor that owns the callstore
//!
//! Processes commands via channels so the single-writer store can be shared by
//! the scheduler, the recall checker and the call actor.

use std::path::Path;

use async_trait::async_trait;
use callstore::{Filter, FilterOp, IndexValue, Store};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::{StateError, StateResponse, StoreCommand};
use super::traits::{HistoryStore, RecallStore, ReminderStore};
use crate::domain::{CallHistoryEntry, PendingRecall, Reminder};

/// Handle to send commands to the StoreManager
#[derive(Clone)]
pub struct StoreManager {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreManager {
    /// Open the store and spawn the actor
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let store = Store::open(store_path.as_ref())?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));

        info!(store_path = %store_path.as_ref().display(), "StoreManager spawned");
        Ok(Self { tx })
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StoreCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Stop the actor, releasing the store lock once pending commands drain
    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(StoreCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

#[async_trait]
impl ReminderStore for StoreManager {
    async fn list_reminders(&self) -> StateResponse<Vec<Reminder>> {
        debug!("list_reminders: called");
        self.request(|reply| StoreCommand::ListReminders { reply }).await
    }

    async fn get_reminder(&self, id: &str) -> StateResponse<Option<Reminder>> {
        debug!(%id, "get_reminder: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::GetReminder { id, reply }).await
    }

    async fn put_reminder(&self, reminder: Reminder) -> StateResponse<()> {
        debug!(reminder_id = %reminder.id, next_trigger = reminder.next_trigger, "put_reminder: called");
        self.request(|reply| StoreCommand::PutReminder { reminder, reply }).await
    }

    async fn delete_reminder(&self, id: &str) -> StateResponse<bool> {
        debug!(%id, "delete_reminder: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::DeleteReminder { id, reply }).await
    }
}

#[async_trait]
impl RecallStore for StoreManager {
    async fn list_recalls(&self) -> StateResponse<Vec<PendingRecall>> {
        debug!("list_recalls: called");
        self.request(|reply| StoreCommand::ListRecalls { reply }).await
    }

    async fn get_recall(&self, reminder_id: &str) -> StateResponse<Option<PendingRecall>> {
        debug!(%reminder_id, "get_recall: called");
        let reminder_id = reminder_id.to_string();
        self.request(|reply| StoreCommand::GetRecall { reminder_id, reply })
            .await
    }

    async fn put_recall(&self, recall: PendingRecall) -> StateResponse<()> {
        debug!(reminder_id = %recall.reminder_id, attempt = recall.attempt, due_at = recall.due_at, "put_recall: called");
        self.request(|reply| StoreCommand::PutRecall { recall, reply }).await
    }

    async fn delete_recall(&self, reminder_id: &str) -> StateResponse<bool> {
        debug!(%reminder_id, "delete_recall: called");
        let reminder_id = reminder_id.to_string();
        self.request(|reply| StoreCommand::DeleteRecall { reminder_id, reply })
            .await
    }

    async fn due_recalls(&self, now: i64) -> StateResponse<Vec<PendingRecall>> {
        debug!(now, "due_recalls: called");
        self.request(|reply| StoreCommand::DueRecalls { now, reply }).await
    }
}

#[async_trait]
impl HistoryStore for StoreManager {
    async fn add_history(&self, entry: CallHistoryEntry) -> StateResponse<()> {
        debug!(entry_id = %entry.id, reminder_id = %entry.reminder_id, attempt = entry.attempt, "add_history: called");
        self.request(|reply| StoreCommand::AddHistory { entry, reply }).await
    }

    async fn update_history(&self, entry: CallHistoryEntry) -> StateResponse<()> {
        debug!(entry_id = %entry.id, "update_history: called");
        self.request(|reply| StoreCommand::UpdateHistory { entry, reply }).await
    }

    async fn get_history(&self, id: &str) -> StateResponse<Option<CallHistoryEntry>> {
        debug!(%id, "get_history: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::GetHistory { id, reply }).await
    }

    async fn list_history(&self, reminder_id: Option<&str>) -> StateResponse<Vec<CallHistoryEntry>> {
        debug!(?reminder_id, "list_history: called");
        let reminder_id = reminder_id.map(str::to_string);
        self.request(|reply| StoreCommand::ListHistory { reminder_id, reply })
            .await
    }
}

/// Actor loop - processes commands sequentially
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StoreCommand>) {
    debug!("actor_loop: called");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::ListReminders { reply } => {
                debug!("actor_loop: ListReminders command");
                let _ = reply.send(store.list::<Reminder>(&[]).map_err(StateError::from));
            }

            StoreCommand::GetReminder { id, reply } => {
                debug!(%id, "actor_loop: GetReminder command");
                let _ = reply.send(store.get::<Reminder>(&id).map_err(StateError::from));
            }

            StoreCommand::PutReminder { reminder, reply } => {
                debug!(reminder_id = %reminder.id, "actor_loop: PutReminder command");
                let _ = reply.send(store.put(reminder).map_err(StateError::from));
            }

            StoreCommand::DeleteReminder { id, reply } => {
                debug!(%id, "actor_loop: DeleteReminder command");
                let _ = reply.send(store.delete::<Reminder>(&id).map_err(StateError::from));
            }

            StoreCommand::ListRecalls { reply } => {
                debug!("actor_loop: ListRecalls command");
                let _ = reply.send(store.list::<PendingRecall>(&[]).map_err(StateError::from));
            }

            StoreCommand::GetRecall { reminder_id, reply } => {
                debug!(%reminder_id, "actor_loop: GetRecall command");
                let _ = reply.send(store.get::<PendingRecall>(&reminder_id).map_err(StateError::from));
            }

            StoreCommand::PutRecall { recall, reply } => {
                debug!(reminder_id = %recall.reminder_id, "actor_loop: PutRecall command");
                let _ = reply.send(store.put(recall).map_err(StateError::from));
            }

            StoreCommand::DeleteRecall { reminder_id, reply } => {
                debug!(%reminder_id, "actor_loop: DeleteRecall command");
                let _ = reply.send(store.delete::<PendingRecall>(&reminder_id).map_err(StateError::from));
            }

            StoreCommand::DueRecalls { now, reply } => {
                debug!(now, "actor_loop: DueRecalls command");
                let filters = [Filter::new("due_at", FilterOp::Le, IndexValue::Int(now))];
                let result = store.list::<PendingRecall>(&filters).map(|mut due| {
                    due.sort_by_key(|recall| recall.due_at);
                    due
                });
                let _ = reply.send(result.map_err(StateError::from));
            }

            StoreCommand::AddHistory { entry, reply } => {
                debug!(entry_id = %entry.id, "actor_loop: AddHistory command");
                let _ = reply.send(store.create(entry).map(|_| ()).map_err(StateError::from));
            }

            StoreCommand::UpdateHistory { entry, reply } => {
                debug!(entry_id = %entry.id, "actor_loop: UpdateHistory command");
                let _ = reply.send(store.update(entry).map_err(StateError::from));
            }

            StoreCommand::GetHistory { id, reply } => {
                debug!(%id, "actor_loop: GetHistory command");
                let _ = reply.send(store.get::<CallHistoryEntry>(&id).map_err(StateError::from));
            }

            StoreCommand::ListHistory { reminder_id, reply } => {
                debug!(?reminder_id, "actor_loop: ListHistory command");
                let filters: Vec<Filter> = reminder_id
                    .into_iter()
                    .map(|id| Filter::eq("reminder_id", IndexValue::String(id)))
                    .collect();
                let result = store.list::<CallHistoryEntry>(&filters).map(|mut entries| {
                    entries.sort_by_key(|entry| entry.triggered_at);
                    entries
                });
                let _ = reply.send(result.map_err(StateError::from));
            }

            StoreCommand::Shutdown => {
                info!("StoreManager shutting down");
                break;
            }
        }
    }

    debug!("StoreManager actor stopped");
}
