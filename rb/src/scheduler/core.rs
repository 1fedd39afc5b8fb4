//! ReminderScheduler - periodic loop that fires due reminders

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::SchedulerConfig;
use super::handle::LoopHandle;
use crate::call::{CallHandle, TriggerRequest};
use crate::domain::Reminder;
use crate::recurrence::Zone;
use crate::store::ReminderStore;
use callstore::now_ms;

/// What one pass over the reminders did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Reminders read from the store
    pub checked: usize,
    /// Due reminders handed to the call actor
    pub fired: usize,
    /// Fired reminders moved to their next occurrence
    pub rescheduled: usize,
    /// Fired one-shot reminders put to sleep
    pub deactivated: usize,
    /// Triggers refused or writes that failed; retried next tick
    pub failed: usize,
}

pub struct ReminderScheduler {
    reminders: Arc<dyn ReminderStore>,
    calls: CallHandle,
    zone: Zone,
    config: SchedulerConfig,
}

impl ReminderScheduler {
    pub fn new(reminders: Arc<dyn ReminderStore>, calls: CallHandle, zone: Zone, config: SchedulerConfig) -> Self {
        debug!(?zone, ?config, "ReminderScheduler::new: called");
        Self {
            reminders,
            calls,
            zone,
            config,
        }
    }

    /// Fire every reminder due at `now` and advance its schedule
    pub async fn tick(&self, now: i64) -> TickReport {
        debug!(now, "ReminderScheduler::tick: called");
        let mut report = TickReport::default();

        let reminders = match self.reminders.list_reminders().await {
            Ok(reminders) => reminders,
            Err(e) => {
                warn!(error = %e, "Failed to read reminders, skipping tick");
                return report;
            }
        };
        report.checked = reminders.len();

        for reminder in reminders.into_iter().filter(|r| r.is_due(now)) {
            self.fire(reminder, now, &mut report).await;
        }

        report
    }

    async fn fire(&self, mut reminder: Reminder, now: i64, report: &mut TickReport) {
        let reminder_id = reminder.id.clone();
        debug!(%reminder_id, next_trigger = reminder.next_trigger, "fire: called");

        match self.calls.trigger(TriggerRequest::scheduled(reminder.clone())).await {
            Ok(outcome) => {
                info!(%reminder_id, title = %reminder.title, ?outcome, "Reminder fired");
                report.fired += 1;
            }
            Err(e) => {
                // Schedule untouched so the next tick tries again
                warn!(%reminder_id, error = %e, "Trigger refused");
                report.failed += 1;
                return;
            }
        }

        let deactivated = match self.zone.next_recurrence(&reminder, now) {
            Some(next) => {
                debug!(%reminder_id, next, "fire: rescheduling");
                reminder.reschedule(next);
                false
            }
            None => {
                debug!(%reminder_id, "fire: one-shot, deactivating");
                reminder.deactivate();
                true
            }
        };

        match self.reminders.put_reminder(reminder).await {
            Ok(()) if deactivated => report.deactivated += 1,
            Ok(()) => report.rescheduled += 1,
            Err(e) => {
                warn!(%reminder_id, error = %e, "Failed to save reminder schedule");
                report.failed += 1;
            }
        }
    }

    /// Tick until `shutdown` flips to true
    ///
    /// Each tick completes before the next sleep starts, so ticks never overlap.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.config.tick_interval_ms, zone = %self.zone, "Reminder scheduler started");
        let interval = self.config.tick_interval();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.tick(now_ms()).await;
            if report.fired > 0 || report.failed > 0 {
                debug!(?report, "run: tick complete");
            }

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
        info!("Reminder scheduler stopped");
    }

    /// Spawn `run` on its own task
    pub fn start(self) -> LoopHandle {
        LoopHandle::spawn("scheduler", move |shutdown| self.run(shutdown))
    }
}
