//! RecallLedger - durable record of pending re-attempts
//!
//! Holds at most one PendingRecall per reminder. Settings live in a watch
//! channel so a reload is seen by the next scheduling decision.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use super::config::RecallConfig;
use crate::domain::{PendingRecall, Reminder};
use crate::store::{RecallStore, StateResponse};

#[derive(Clone)]
pub struct RecallLedger {
    store: Arc<dyn RecallStore>,
    settings: Arc<watch::Sender<RecallConfig>>,
}

impl RecallLedger {
    pub fn new(store: Arc<dyn RecallStore>, config: RecallConfig) -> Self {
        debug!(enabled = config.enabled, max_attempts = config.max_attempts, "RecallLedger::new: called");
        let (settings, _) = watch::channel(config);
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    /// Current recall settings
    pub fn settings(&self) -> RecallConfig {
        self.settings.borrow().clone()
    }

    /// Watch for settings changes
    pub fn subscribe(&self) -> watch::Receiver<RecallConfig> {
        self.settings.subscribe()
    }

    /// Replace the recall settings
    ///
    /// Turning recall off drops every pending row. Returns how many were dropped.
    pub async fn update_settings(&self, config: RecallConfig) -> StateResponse<usize> {
        debug!(enabled = config.enabled, "update_settings: called");
        let disabling = !config.enabled;
        let previous = self.settings.send_replace(config);
        if disabling {
            if previous.enabled {
                info!("Auto-recall disabled, clearing pending recalls");
            }
            return self.cancel_all().await;
        }
        Ok(0)
    }

    /// Schedule a re-attempt after `attempt` was declined or missed
    ///
    /// Returns the stored row, or `None` when recall is off or the attempt
    /// budget is spent. Replaces any row already pending for the reminder.
    pub async fn schedule_recall(
        &self,
        reminder: &Reminder,
        attempt: u32,
        history_id: &str,
        now: i64,
    ) -> StateResponse<Option<PendingRecall>> {
        debug!(reminder_id = %reminder.id, attempt, %history_id, now, "schedule_recall: called");
        let settings = self.settings();
        if !settings.enabled {
            debug!(reminder_id = %reminder.id, "schedule_recall: recall disabled");
            return Ok(None);
        }
        if !settings.allows(attempt) {
            info!(reminder_id = %reminder.id, attempt, max_attempts = settings.max_attempts, "Recall budget exhausted");
            return Ok(None);
        }

        let delay = settings.backoff_for(attempt);
        let recall = PendingRecall::new(reminder.clone(), attempt + 1, now.saturating_add(delay), history_id);
        self.store.put_recall(recall.clone()).await?;
        info!(
            reminder_id = %reminder.id,
            next_attempt = recall.attempt,
            due_at = recall.due_at,
            delay_ms = delay,
            "Scheduled recall"
        );
        Ok(Some(recall))
    }

    /// Remove the pending recall for a reminder, if any
    pub async fn cancel_recall(&self, reminder_id: &str) -> StateResponse<bool> {
        debug!(%reminder_id, "cancel_recall: called");
        self.store.delete_recall(reminder_id).await
    }

    /// Remove every pending recall
    pub async fn cancel_all(&self) -> StateResponse<usize> {
        debug!("cancel_all: called");
        let mut removed = 0;
        for recall in self.store.list_recalls().await? {
            if self.store.delete_recall(&recall.reminder_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Rows due at or before `now`, earliest first
    pub async fn due(&self, now: i64) -> StateResponse<Vec<PendingRecall>> {
        debug!(now, "due: called");
        self.store.due_recalls(now).await
    }

    /// Every pending row
    pub async fn pending(&self) -> StateResponse<Vec<PendingRecall>> {
        self.store.list_recalls().await
    }

    /// Put a row back, e.g. after its trigger was refused
    pub async fn restore(&self, recall: PendingRecall) -> StateResponse<()> {
        debug!(reminder_id = %recall.reminder_id, "restore: called");
        self.store.put_recall(recall).await
    }
}
