//! RecallChecker - periodic loop that re-rings missed reminders

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::ledger::RecallLedger;
use crate::call::{CallHandle, TriggerRequest};
use crate::domain::PendingRecall;
use crate::scheduler::LoopHandle;
use callstore::now_ms;

/// What one pass over the ledger did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Rows found due
    pub due: usize,
    /// Triggers accepted by the call actor
    pub fired: usize,
    /// Rows left in place to retry next tick
    pub failed: usize,
}

pub struct RecallChecker {
    ledger: RecallLedger,
    calls: CallHandle,
}

impl RecallChecker {
    pub fn new(ledger: RecallLedger, calls: CallHandle) -> Self {
        Self { ledger, calls }
    }

    /// Fire every recall due at `now`
    ///
    /// Each row is removed before its trigger is submitted. A row that is
    /// already gone by then was cancelled by an answer and is skipped. A row
    /// whose trigger is refused is put back so the next tick retries it.
    pub async fn tick(&self, now: i64) -> CheckReport {
        debug!(now, "RecallChecker::tick: called");
        let mut report = CheckReport::default();

        let due = match self.ledger.due(now).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "Failed to read recall ledger, skipping tick");
                return report;
            }
        };
        report.due = due.len();

        for recall in due {
            let reminder_id = recall.reminder_id.clone();
            match self.ledger.cancel_recall(&reminder_id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(%reminder_id, "tick: recall already cancelled, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(%reminder_id, error = %e, "Failed to remove due recall, retrying next tick");
                    report.failed += 1;
                    continue;
                }
            }

            let request = TriggerRequest::recall(recall.reminder.clone(), recall.attempt);
            match self.calls.trigger(request).await {
                Ok(outcome) => {
                    info!(%reminder_id, attempt = recall.attempt, ?outcome, "Recall fired");
                    report.fired += 1;
                }
                Err(e) => {
                    warn!(%reminder_id, error = %e, "Recall trigger refused, restoring");
                    self.restore(recall).await;
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn restore(&self, recall: PendingRecall) {
        let reminder_id = recall.reminder_id.clone();
        if let Err(e) = self.ledger.restore(recall).await {
            warn!(%reminder_id, error = %e, "Failed to restore recall");
        }
    }

    /// Poll the ledger until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Recall checker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.tick(now_ms()).await;
            if report.due > 0 {
                debug!(?report, "run: tick complete");
            }

            let interval = self.ledger.settings().check_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("run: shutdown sender dropped");
                        break;
                    }
                }
            }
        }
        info!("Recall checker stopped");
    }

    /// Spawn `run` on its own task
    pub fn start(self) -> LoopHandle {
        LoopHandle::spawn("recall-checker", move |shutdown| self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallConfig, CallManager, CallState};
    use crate::domain::{Reminder, Repeat};
    use crate::recall::RecallConfig;
    use crate::store::{HistoryStore, MemoryStore, RecallStore, StateResponse};
    use std::sync::Arc;

    fn setup(config: CallConfig) -> (RecallChecker, RecallLedger, CallHandle, MemoryStore) {
        let store = MemoryStore::new();
        let ledger = RecallLedger::new(Arc::new(store.clone()), RecallConfig::default());
        let manager = CallManager::new(config, ledger.clone(), Arc::new(store.clone()));
        let calls = manager.handle();
        tokio::spawn(manager.run());
        (RecallChecker::new(ledger.clone(), calls.clone()), ledger, calls, store)
    }

    fn quiet() -> CallConfig {
        CallConfig {
            cooldown_ms: 0,
            ring_timeout_secs: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_due_recall_rings_with_stored_attempt() {
        let (checker, _ledger, calls, store) = setup(quiet());
        let reminder = Reminder::new("Call the bank", "10:00", Repeat::Once);
        store
            .put_recall(PendingRecall::new(reminder.clone(), 3, 1_000, "h"))
            .await
            .unwrap();

        assert_eq!(checker.tick(999).await, CheckReport::default());

        let report = checker.tick(1_000).await;
        assert_eq!(report.due, 1);
        assert_eq!(report.fired, 1);
        assert!(store.list_recalls().await.unwrap().is_empty());

        let snapshot = calls.state().await.unwrap();
        assert_eq!(snapshot.state, CallState::Incoming);
        assert_eq!(snapshot.reminder_id, Some(reminder.id));
        assert_eq!(snapshot.attempt, Some(3));
    }

    #[tokio::test]
    async fn test_answered_call_leaves_nothing_to_recall() {
        let (checker, ledger, calls, _store) = setup(quiet());
        let reminder = Reminder::new("Stretch", "10:00", Repeat::Hourly);
        ledger.schedule_recall(&reminder, 1, "h", 0).await.unwrap();

        calls
            .trigger(TriggerRequest::scheduled(reminder.clone()))
            .await
            .unwrap();
        calls.answer().await.unwrap();

        let report = checker.tick(i64::MAX).await;
        assert_eq!(report.due, 0);
        assert_eq!(calls.state().await.unwrap().state, CallState::Idle);
    }

    #[tokio::test]
    async fn test_refused_trigger_is_restored() {
        let (checker, _ledger, calls, store) = setup(CallConfig {
            max_queued: 0,
            ..quiet()
        });
        let busy = Reminder::new("Busy", "10:00", Repeat::Once);
        calls.trigger(TriggerRequest::scheduled(busy)).await.unwrap();

        let waiting = Reminder::new("Waiting", "10:00", Repeat::Once);
        store
            .put_recall(PendingRecall::new(waiting.clone(), 2, 0, "h"))
            .await
            .unwrap();

        let report = checker.tick(10).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.fired, 0);
        let rows = store.list_recalls().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reminder_id, waiting.id);
    }

    /// Recall store whose due listing still reports rows another caller removed
    struct StaleListing {
        inner: MemoryStore,
        listed: Vec<PendingRecall>,
    }

    #[async_trait::async_trait]
    impl RecallStore for StaleListing {
        async fn list_recalls(&self) -> StateResponse<Vec<PendingRecall>> {
            self.inner.list_recalls().await
        }

        async fn get_recall(&self, reminder_id: &str) -> StateResponse<Option<PendingRecall>> {
            self.inner.get_recall(reminder_id).await
        }

        async fn put_recall(&self, recall: PendingRecall) -> StateResponse<()> {
            self.inner.put_recall(recall).await
        }

        async fn delete_recall(&self, reminder_id: &str) -> StateResponse<bool> {
            self.inner.delete_recall(reminder_id).await
        }

        async fn due_recalls(&self, _now: i64) -> StateResponse<Vec<PendingRecall>> {
            Ok(self.listed.clone())
        }
    }

    #[tokio::test]
    async fn test_recall_cancelled_after_listing_is_skipped() {
        let store = MemoryStore::new();
        let reminder = Reminder::new("Answered meanwhile", "10:00", Repeat::Once);
        let stale = StaleListing {
            inner: store.clone(),
            listed: vec![PendingRecall::new(reminder, 2, 0, "h")],
        };
        let ledger = RecallLedger::new(Arc::new(stale), RecallConfig::default());
        let manager = CallManager::new(quiet(), ledger.clone(), Arc::new(store.clone()));
        let calls = manager.handle();
        tokio::spawn(manager.run());
        let checker = RecallChecker::new(ledger, calls.clone());

        let report = checker.tick(10).await;
        assert_eq!(report.due, 1);
        assert_eq!(report.fired, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(calls.state().await.unwrap().state, CallState::Idle);
        assert!(store.list_history(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_skips_tick() {
        let (checker, _ledger, calls, store) = setup(quiet());
        store.set_unavailable(true);
        assert_eq!(checker.tick(i64::MAX).await, CheckReport::default());
        assert_eq!(calls.state().await.unwrap().state, CallState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (checker, _ledger, _calls, store) = setup(quiet());
        let reminder = Reminder::new("Loop", "10:00", Repeat::Once);
        store
            .put_recall(PendingRecall::new(reminder, 2, 0, "h"))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(checker.run(rx));
        tokio::time::sleep(std::time::Duration::from_secs(6)).await;
        assert!(store.list_recalls().await.unwrap().is_empty());

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
