//! Runtime - wires the call actor, scheduler and recall checker together

use std::sync::Arc;

use eyre::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::call::{CallHandle, CallManager, CallPresenter, EventBus, VoiceDispatcher};
use crate::config::Config;
use crate::recall::{RecallChecker, RecallLedger};
use crate::recurrence::Zone;
use crate::scheduler::{LoopHandle, ReminderScheduler};
use crate::store::Stores;

/// A running engine
///
/// Owns the call actor task and both polling loops. Dropping it leaves the
/// tasks running; call `shutdown` to stop them in order.
pub struct Runtime {
    calls: CallHandle,
    events: Arc<EventBus>,
    ledger: RecallLedger,
    zone: Zone,
    call_task: JoinHandle<()>,
    scheduler: LoopHandle,
    checker: LoopHandle,
}

impl Runtime {
    /// Start every component
    ///
    /// `voice` receives the call handle so it can report the end of playback.
    pub fn start<V>(config: &Config, stores: Stores, presenter: Arc<dyn CallPresenter>, voice: V) -> Result<Self>
    where
        V: FnOnce(CallHandle) -> Arc<dyn VoiceDispatcher>,
    {
        debug!("Runtime::start: called");
        config.validate()?;
        let zone = config.zone()?;

        let ledger = RecallLedger::new(stores.recalls.clone(), config.recall.clone());
        let manager = CallManager::new(config.call.clone(), ledger.clone(), stores.history.clone());
        let calls = manager.handle();
        let events = manager.events();
        let manager = manager.with_presenter(presenter).with_voice(voice(calls.clone()));
        let call_task = tokio::spawn(manager.run());

        let scheduler =
            ReminderScheduler::new(stores.reminders.clone(), calls.clone(), zone, config.scheduler.clone()).start();
        let checker = RecallChecker::new(ledger.clone(), calls.clone()).start();

        info!(%zone, "Runtime started");
        Ok(Self {
            calls,
            events,
            ledger,
            zone,
            call_task,
            scheduler,
            checker,
        })
    }

    pub fn calls(&self) -> &CallHandle {
        &self.calls
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn ledger(&self) -> &RecallLedger {
        &self.ledger
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// True while both loops are running
    pub fn is_active(&self) -> bool {
        self.scheduler.is_active() && self.checker.is_active()
    }

    /// Apply the recall section of a freshly loaded config
    ///
    /// Other sections take effect on the next start. Returns the number of
    /// pending recalls dropped because recall was switched off.
    pub async fn reload(&self, config: &Config) -> Result<usize> {
        debug!("Runtime::reload: called");
        config.validate()?;
        let cancelled = self.ledger.update_settings(config.recall.clone()).await?;
        info!(cancelled, enabled = config.recall.enabled, "Recall settings reloaded");
        Ok(cancelled)
    }

    /// Stop the loops, then the call actor
    pub async fn shutdown(self) {
        debug!("Runtime::shutdown: called");
        self.scheduler.stop().await;
        self.checker.stop().await;

        if let Err(e) = self.calls.shutdown().await {
            warn!(error = %e, "Call actor already stopped");
        }
        if let Err(e) = self.call_task.await {
            warn!(error = %e, "Call actor ended abnormally");
        }
        info!("Runtime stopped");
    }
}
