//! CallManager - actor that owns the single call slot
//!
//! Every transition arrives as a `CallCommand`, so triggers from the
//! scheduler, the recall checker and the user are serialized. Ring timeouts
//! and the post-call cool-down are deadlines on the same loop.

use std::collections::VecDeque;
use std::sync::Arc;

use callstore::now_ms;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::config::CallConfig;
use super::events::{CallEvent, EventBus};
use super::handle::CallHandle;
use super::messages::{
    CallCommand, CallError, CallResult, CallSnapshot, CallState, TriggerOutcome, TriggerRequest,
};
use super::voice::{CallPresenter, NoopPresenter, PlaybackRequest, SilentVoice, VoiceDispatcher};
use crate::domain::{CallHistoryEntry, PendingRecall, Reminder};
use crate::recall::RecallLedger;
use crate::store::HistoryStore;

/// A call occupying the slot
struct LiveCall {
    reminder: Reminder,
    entry: CallHistoryEntry,
}

enum Slot {
    Idle,
    Incoming {
        call: LiveCall,
        ring_deadline: Option<Instant>,
    },
    Active {
        call: LiveCall,
    },
    Ended {
        until: Instant,
    },
}

impl Slot {
    fn state(&self) -> CallState {
        match self {
            Self::Idle => CallState::Idle,
            Self::Incoming { .. } => CallState::Incoming,
            Self::Active { .. } => CallState::Active,
            Self::Ended { .. } => CallState::Ended,
        }
    }

    fn call(&self) -> Option<&LiveCall> {
        match self {
            Self::Incoming { call, .. } | Self::Active { call } => Some(call),
            Self::Idle | Self::Ended { .. } => None,
        }
    }
}

/// Owns the call slot; consumed by `run`
pub struct CallManager {
    config: CallConfig,
    tx: mpsc::Sender<CallCommand>,
    rx: mpsc::Receiver<CallCommand>,
    ledger: RecallLedger,
    history: Arc<dyn HistoryStore>,
    presenter: Arc<dyn CallPresenter>,
    voice: Arc<dyn VoiceDispatcher>,
    events: Arc<EventBus>,
}

impl CallManager {
    pub fn new(config: CallConfig, ledger: RecallLedger, history: Arc<dyn HistoryStore>) -> Self {
        debug!(?config, "CallManager::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        Self {
            config,
            tx,
            rx,
            ledger,
            history,
            presenter: Arc::new(NoopPresenter),
            voice: Arc::new(SilentVoice),
            events: Arc::new(EventBus::with_default_capacity()),
        }
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn CallPresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn with_voice(mut self, voice: Arc<dyn VoiceDispatcher>) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Get a handle for sending commands
    pub fn handle(&self) -> CallHandle {
        CallHandle::new(self.tx.clone())
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Run the call actor
    ///
    /// Runs until a `Shutdown` command arrives or every handle is dropped.
    pub async fn run(self) {
        let Self {
            config,
            tx,
            mut rx,
            ledger,
            history,
            presenter,
            voice,
            events,
        } = self;
        drop(tx);

        let mut actor = CallActor {
            config,
            ledger,
            history,
            presenter,
            voice,
            events,
            slot: Slot::Idle,
            queue: VecDeque::new(),
        };

        info!("Call actor started");
        loop {
            let deadline = actor.deadline();
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("run: all handles dropped");
                        break;
                    };
                    if !actor.dispatch(cmd).await {
                        debug!("run: shutdown requested");
                        break;
                    }
                }
                _ = wait_for(deadline) => {
                    actor.on_deadline().await;
                }
            }
        }

        actor.shutdown().await;
        info!("Call actor stopped");
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

struct CallActor {
    config: CallConfig,
    ledger: RecallLedger,
    history: Arc<dyn HistoryStore>,
    presenter: Arc<dyn CallPresenter>,
    voice: Arc<dyn VoiceDispatcher>,
    events: Arc<EventBus>,
    slot: Slot,
    queue: VecDeque<TriggerRequest>,
}

impl CallActor {
    /// Returns false when the actor should stop
    async fn dispatch(&mut self, cmd: CallCommand) -> bool {
        match cmd {
            CallCommand::Trigger { request, reply } => {
                let _ = reply.send(self.trigger(request).await);
            }
            CallCommand::Answer { reply } => {
                let _ = reply.send(self.answer().await);
            }
            CallCommand::Decline { reply } => {
                let _ = reply.send(self.decline().await);
            }
            CallCommand::Hangup { reply } => {
                let _ = reply.send(self.hangup().await);
            }
            CallCommand::SpeechEnded {
                call_id,
                success,
                reply,
            } => {
                let _ = reply.send(self.speech_ended(call_id, success).await);
            }
            CallCommand::GetState { reply } => {
                let _ = reply.send(self.snapshot());
            }
            CallCommand::Shutdown => return false,
        }
        true
    }

    fn snapshot(&self) -> CallSnapshot {
        let call = self.slot.call();
        CallSnapshot {
            state: self.slot.state(),
            call_id: call.map(|c| c.entry.id.clone()),
            reminder_id: call.map(|c| c.reminder.id.clone()),
            attempt: call.map(|c| c.entry.attempt),
            queued: self.queue.len(),
        }
    }

    fn deadline(&self) -> Option<Instant> {
        match &self.slot {
            Slot::Incoming { ring_deadline, .. } => *ring_deadline,
            Slot::Ended { until } => Some(*until),
            Slot::Idle | Slot::Active { .. } => None,
        }
    }

    fn invalid(&self, action: &'static str) -> CallError {
        debug!(action, state = %self.slot.state(), "invalid transition");
        CallError::InvalidTransition {
            action,
            state: self.slot.state(),
        }
    }

    async fn trigger(&mut self, request: TriggerRequest) -> CallResult<TriggerOutcome> {
        debug!(reminder_id = %request.reminder.id, attempt = request.attempt, "CallActor::trigger: called");
        if matches!(self.slot, Slot::Idle) {
            let call_id = self.start_call(request).await;
            return Ok(TriggerOutcome::Started { call_id });
        }

        let reminder_id = request.reminder.id.clone();
        let live = self.slot.call().is_some_and(|c| c.reminder.id == reminder_id);
        if live || self.queue.iter().any(|queued| queued.reminder.id == reminder_id) {
            debug!(%reminder_id, "trigger: reminder already live or queued, coalescing");
            return Ok(TriggerOutcome::Coalesced);
        }
        if self.queue.len() >= self.config.max_queued {
            warn!(%reminder_id, capacity = self.config.max_queued, "Call queue full, rejecting trigger");
            return Err(CallError::QueueFull {
                capacity: self.config.max_queued,
            });
        }

        self.queue.push_back(request);
        let position = self.queue.len();
        debug!(%reminder_id, position, "trigger: queued behind live call");
        self.events.emit(CallEvent::Queued { reminder_id, position });
        Ok(TriggerOutcome::Queued { position })
    }

    /// Idle -> Incoming
    async fn start_call(&mut self, request: TriggerRequest) -> String {
        let TriggerRequest {
            reminder,
            attempt,
            source,
        } = request;
        let entry = CallHistoryEntry::start(&reminder, attempt, now_ms());
        let call_id = entry.id.clone();

        if let Err(e) = self.history.add_history(entry.clone()).await {
            warn!(%call_id, error = %e, "Failed to record call history");
        }
        info!(%call_id, reminder_id = %reminder.id, attempt = entry.attempt, ?source, "Incoming call");

        self.presenter.on_trigger(&reminder, entry.attempt).await;
        self.events.emit(CallEvent::Incoming {
            call_id: call_id.clone(),
            reminder_id: reminder.id.clone(),
            title: reminder.title.clone(),
            attempt: entry.attempt,
            source,
        });

        let ring_deadline = self.config.ring_timeout().map(|timeout| Instant::now() + timeout);
        self.slot = Slot::Incoming {
            call: LiveCall { reminder, entry },
            ring_deadline,
        };
        call_id
    }

    /// Incoming -> Active (or straight to Ended if playback cannot start)
    async fn answer(&mut self) -> CallResult<()> {
        let mut call = match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Incoming { call, .. } => call,
            other => {
                self.slot = other;
                return Err(self.invalid("answer"));
            }
        };
        let call_id = call.entry.id.clone();
        let reminder_id = call.reminder.id.clone();
        debug!(%call_id, %reminder_id, "CallActor::answer: called");

        match self.ledger.cancel_recall(&reminder_id).await {
            Ok(true) => info!(%reminder_id, "Answered, pending recall cancelled"),
            Ok(false) => {}
            Err(e) => warn!(%reminder_id, error = %e, "Failed to cancel pending recall"),
        }

        if let Err(e) = call.entry.mark_answered(now_ms()) {
            warn!(%call_id, error = %e, "answer: history entry rejected update");
        }
        self.persist(&call.entry).await;
        self.events.emit(CallEvent::Answered {
            call_id: call_id.clone(),
            reminder_id: reminder_id.clone(),
        });

        let request = PlaybackRequest::for_reminder(call_id.clone(), &call.reminder);
        match self.voice.start_playback(request).await {
            Ok(()) => {
                debug!(%call_id, "answer: playback started");
                self.presenter.on_speaking_start(&call.reminder).await;
                self.events.emit(CallEvent::SpeakingStarted { call_id, reminder_id });
                self.slot = Slot::Active { call };
            }
            Err(e) => {
                warn!(%call_id, error = %e, "Playback failed to start, ending call");
                if let Err(e) = call.entry.record_playback(false, false) {
                    warn!(%call_id, error = %e, "answer: history entry rejected update");
                }
                self.finish_answered(call).await;
            }
        }
        Ok(())
    }

    /// Incoming -> Ended
    async fn decline(&mut self) -> CallResult<()> {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Incoming { call, .. } => {
                debug!(call_id = %call.entry.id, "CallActor::decline: called");
                self.finish_missed(call, false).await;
                Ok(())
            }
            other => {
                self.slot = other;
                Err(self.invalid("decline"))
            }
        }
    }

    /// Active -> Ended, cutting playback short
    async fn hangup(&mut self) -> CallResult<()> {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Active { call } => {
                debug!(call_id = %call.entry.id, "CallActor::hangup: called");
                self.end_speaking(call, false).await;
                Ok(())
            }
            other => {
                self.slot = other;
                Err(self.invalid("hang up"))
            }
        }
    }

    /// Active -> Ended once playback reports completion
    async fn speech_ended(&mut self, call_id: Option<String>, success: bool) -> CallResult<()> {
        let call = match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Active { call } => call,
            other => {
                self.slot = other;
                return Err(self.invalid("finish speaking"));
            }
        };
        if let Some(got) = call_id
            && got != call.entry.id
        {
            debug!(%got, live = %call.entry.id, "speech_ended: stale signal");
            self.slot = Slot::Active { call };
            return Err(CallError::StaleSignal { got });
        }

        self.end_speaking(call, success).await;
        Ok(())
    }

    async fn end_speaking(&mut self, mut call: LiveCall, success: bool) {
        let call_id = call.entry.id.clone();
        if let Err(e) = call.entry.record_playback(true, success) {
            warn!(%call_id, error = %e, "end_speaking: history entry rejected update");
        }
        self.presenter.on_speaking_end(&call.reminder).await;
        self.events.emit(CallEvent::SpeakingEnded {
            call_id,
            reminder_id: call.reminder.id.clone(),
            success,
        });
        self.finish_answered(call).await;
    }

    async fn finish_answered(&mut self, mut call: LiveCall) {
        let call_id = call.entry.id.clone();
        if let Err(e) = call.entry.mark_ended(now_ms()) {
            warn!(%call_id, error = %e, "finish_answered: history entry rejected update");
        }
        self.persist(&call.entry).await;

        let duration_ms = call.entry.duration_ms.unwrap_or(0);
        info!(%call_id, reminder_id = %call.reminder.id, duration_ms, "Call ended");
        self.presenter.on_call_ended(&call.entry).await;
        self.events.emit(CallEvent::Ended {
            call_id,
            reminder_id: call.reminder.id.clone(),
            duration_ms,
        });
        self.enter_cooldown().await;
    }

    async fn finish_missed(&mut self, mut call: LiveCall, timed_out: bool) {
        let now = now_ms();
        let call_id = call.entry.id.clone();
        let reminder_id = call.reminder.id.clone();
        let attempt = call.entry.attempt;

        if let Err(e) = call.entry.mark_ended(now) {
            warn!(%call_id, error = %e, "finish_missed: history entry rejected update");
        }
        self.persist(&call.entry).await;

        info!(%call_id, %reminder_id, attempt, timed_out, "Call missed");
        self.presenter.on_call_ended(&call.entry).await;
        self.events.emit(CallEvent::Missed {
            call_id: call_id.clone(),
            reminder_id: reminder_id.clone(),
            attempt,
            timed_out,
        });

        match self.ledger.schedule_recall(&call.reminder, attempt, &call_id, now).await {
            Ok(Some(recall)) => {
                self.events.emit(CallEvent::RecallScheduled {
                    reminder_id,
                    attempt: recall.attempt,
                    due_at: recall.due_at,
                });
            }
            Ok(None) => debug!(%reminder_id, attempt, "finish_missed: no recall scheduled"),
            Err(e) => {
                warn!(%reminder_id, attempt, error = %e, "Failed to schedule recall");
                self.events.emit(CallEvent::RecallFailed {
                    reminder_id,
                    attempt: attempt + 1,
                    error: e.to_string(),
                });
            }
        }
        self.enter_cooldown().await;
    }

    async fn enter_cooldown(&mut self) {
        let cooldown = self.config.cooldown();
        if cooldown.is_zero() {
            self.become_idle().await;
        } else {
            debug!(?cooldown, "enter_cooldown: slot cooling down");
            self.slot = Slot::Ended {
                until: Instant::now() + cooldown,
            };
        }
    }

    async fn become_idle(&mut self) {
        self.slot = Slot::Idle;
        self.events.emit(CallEvent::Idle);
        if let Some(next) = self.queue.pop_front() {
            debug!(reminder_id = %next.reminder.id, "become_idle: starting queued call");
            self.start_call(next).await;
        }
    }

    async fn on_deadline(&mut self) {
        let now = Instant::now();
        let expired = match &self.slot {
            Slot::Incoming {
                ring_deadline: Some(deadline),
                ..
            } => now >= *deadline,
            Slot::Ended { until } => now >= *until,
            _ => false,
        };
        if !expired {
            return;
        }

        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Incoming { call, .. } => {
                info!(call_id = %call.entry.id, "Ring timeout, treating call as missed");
                self.finish_missed(call, true).await;
            }
            Slot::Ended { .. } => self.become_idle().await,
            other => self.slot = other,
        }
    }

    /// Close out whatever is live so history never keeps a dangling call
    ///
    /// Queued triggers are parked in the recall ledger, due immediately, so
    /// they ring on the next start.
    async fn shutdown(&mut self) {
        let queued: Vec<TriggerRequest> = self.queue.drain(..).collect();
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Incoming { call, .. } => self.finish_missed(call, false).await,
            Slot::Active { call } => self.end_speaking(call, false).await,
            Slot::Idle | Slot::Ended { .. } => {}
        }
        if !queued.is_empty() {
            info!(count = queued.len(), "Parking queued calls as pending recalls");
        }
        let now = now_ms();
        for request in queued {
            let reminder_id = request.reminder.id.clone();
            let recall = PendingRecall::new(request.reminder, request.attempt, now, "");
            if let Err(e) = self.ledger.restore(recall).await {
                warn!(%reminder_id, error = %e, "Failed to park queued call");
            }
        }
    }

    async fn persist(&self, entry: &CallHistoryEntry) {
        if let Err(e) = self.history.update_history(entry.clone()).await {
            warn!(entry_id = %entry.id, error = %e, "Failed to update call history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::voice::VoiceError;
    use crate::domain::{MINUTE_MS, PendingRecall, Repeat};
    use crate::recall::RecallConfig;
    use crate::store::{MemoryStore, RecallStore};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct AcceptingVoice;

    #[async_trait]
    impl VoiceDispatcher for AcceptingVoice {
        async fn start_playback(&self, _request: PlaybackRequest) -> Result<(), VoiceError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingPresenter {
        fn log(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CallPresenter for RecordingPresenter {
        async fn on_trigger(&self, reminder: &Reminder, attempt: u32) {
            self.calls.lock().unwrap().push(format!("trigger:{}:{}", reminder.title, attempt));
        }

        async fn on_speaking_start(&self, reminder: &Reminder) {
            self.calls.lock().unwrap().push(format!("speak:{}", reminder.title));
        }

        async fn on_speaking_end(&self, reminder: &Reminder) {
            self.calls.lock().unwrap().push(format!("silent:{}", reminder.title));
        }

        async fn on_call_ended(&self, entry: &CallHistoryEntry) {
            self.calls.lock().unwrap().push(format!("ended:{}", entry.title));
        }
    }

    struct Harness {
        handle: CallHandle,
        events: broadcast::Receiver<CallEvent>,
        store: MemoryStore,
        presenter: Arc<RecordingPresenter>,
    }

    fn quiet_config() -> CallConfig {
        CallConfig {
            cooldown_ms: 0,
            ring_timeout_secs: 0,
            ..Default::default()
        }
    }

    fn spawn_with(
        config: CallConfig,
        voice: Arc<dyn VoiceDispatcher>,
        store: MemoryStore,
        recalls: Arc<dyn RecallStore>,
    ) -> Harness {
        let ledger = RecallLedger::new(recalls, RecallConfig::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let manager = CallManager::new(config, ledger, Arc::new(store.clone()))
            .with_voice(voice)
            .with_presenter(presenter.clone());
        let handle = manager.handle();
        let events = manager.events().subscribe();
        tokio::spawn(manager.run());
        Harness {
            handle,
            events,
            store,
            presenter,
        }
    }

    fn spawn(config: CallConfig, voice: Arc<dyn VoiceDispatcher>) -> Harness {
        let store = MemoryStore::new();
        spawn_with(config, voice, store.clone(), Arc::new(store))
    }

    async fn wait_for_event(events: &mut broadcast::Receiver<CallEvent>, event_type: &str) -> CallEvent {
        loop {
            let event = events.recv().await.unwrap();
            if event.event_type() == event_type {
                return event;
            }
        }
    }

    async fn only_entry(store: &MemoryStore) -> CallHistoryEntry {
        let mut entries = store.list_history(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        entries.remove(0)
    }

    fn meds() -> Reminder {
        Reminder::new("Meds", "08:00", Repeat::Daily)
    }

    #[tokio::test]
    async fn test_answer_with_failed_playback_ends_call() {
        let h = spawn(quiet_config(), Arc::new(SilentVoice));
        let outcome = h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Started { .. }));

        let snapshot = h.handle.state().await.unwrap();
        assert_eq!(snapshot.state, CallState::Incoming);
        assert_eq!(snapshot.attempt, Some(1));

        h.handle.answer().await.unwrap();
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Idle);

        let entry = only_entry(&h.store).await;
        assert!(entry.answered);
        assert!(entry.ended_at.is_some());
        assert!(!entry.voice_played_successfully);
        assert_eq!(h.presenter.log(), vec!["trigger:Meds:1", "ended:Meds"]);
    }

    #[tokio::test]
    async fn test_full_call_speaks_then_ends() {
        let mut h = spawn(quiet_config(), Arc::new(AcceptingVoice));
        h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap();
        h.handle.answer().await.unwrap();
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Active);

        h.handle.speech_ended(true).await.unwrap();
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Idle);

        let entry = only_entry(&h.store).await;
        assert!(entry.voice_played);
        assert!(entry.voice_played_successfully);
        assert!(entry.duration_ms.unwrap() >= 0);
        assert_eq!(
            h.presenter.log(),
            vec!["trigger:Meds:1", "speak:Meds", "silent:Meds", "ended:Meds"]
        );

        let mut seen = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            seen.push(event.event_type());
        }
        assert_eq!(
            seen,
            vec!["incoming", "answered", "speaking_started", "speaking_ended", "ended", "idle"]
        );
    }

    #[tokio::test]
    async fn test_invalid_transitions_change_nothing() {
        let h = spawn(quiet_config(), Arc::new(AcceptingVoice));
        assert_eq!(
            h.handle.answer().await,
            Err(CallError::InvalidTransition {
                action: "answer",
                state: CallState::Idle
            })
        );
        assert!(h.handle.decline().await.is_err());
        assert!(h.handle.hangup().await.is_err());
        assert!(h.handle.speech_ended(true).await.is_err());

        h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap();
        assert_eq!(
            h.handle.hangup().await,
            Err(CallError::InvalidTransition {
                action: "hang up",
                state: CallState::Incoming
            })
        );
        assert!(h.handle.speech_ended(true).await.is_err());
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Incoming);
    }

    #[tokio::test]
    async fn test_decline_schedules_recall() {
        let mut h = spawn(quiet_config(), Arc::new(AcceptingVoice));
        let reminder = meds();
        h.handle.trigger(TriggerRequest::scheduled(reminder.clone())).await.unwrap();
        h.handle.decline().await.unwrap();

        let missed = wait_for_event(&mut h.events, "missed").await;
        assert!(matches!(missed, CallEvent::Missed { timed_out: false, attempt: 1, .. }));
        let scheduled = wait_for_event(&mut h.events, "recall_scheduled").await;
        assert!(matches!(scheduled, CallEvent::RecallScheduled { attempt: 2, .. }));

        let entry = only_entry(&h.store).await;
        assert_eq!(entry.duration_ms, Some(0));
        assert!(!entry.answered);

        let recalls = h.store.list_recalls().await.unwrap();
        assert_eq!(recalls.len(), 1);
        assert_eq!(recalls[0].reminder_id, reminder.id);
        assert_eq!(recalls[0].attempt, 2);
        assert_eq!(recalls[0].history_id, entry.id);
        assert_eq!(recalls[0].due_at - entry.ended_at.unwrap(), 5 * MINUTE_MS);
    }

    #[tokio::test]
    async fn test_answer_cancels_pending_recall() {
        let h = spawn(quiet_config(), Arc::new(AcceptingVoice));
        let reminder = meds();
        h.store
            .put_recall(PendingRecall::new(reminder.clone(), 3, i64::MAX, "old"))
            .await
            .unwrap();

        h.handle.trigger(TriggerRequest::recall(reminder.clone(), 2)).await.unwrap();
        h.handle.answer().await.unwrap();

        assert!(h.store.list_recalls().await.unwrap().is_empty());
        assert_eq!(only_entry(&h.store).await.attempt, 2);
    }

    #[tokio::test]
    async fn test_recall_failure_surfaces_event() {
        let broken = MemoryStore::new();
        broken.set_unavailable(true);
        let mut h = spawn_with(quiet_config(), Arc::new(AcceptingVoice), MemoryStore::new(), Arc::new(broken));

        h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap();
        h.handle.decline().await.unwrap();

        let failed = wait_for_event(&mut h.events, "recall_failed").await;
        assert!(matches!(failed, CallEvent::RecallFailed { attempt: 2, .. }));
        // The call still ends
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Idle);
        assert!(only_entry(&h.store).await.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_overlapping_triggers_queue_and_coalesce() {
        let config = CallConfig {
            max_queued: 1,
            ..quiet_config()
        };
        let h = spawn(config, Arc::new(AcceptingVoice));
        let a = Reminder::new("A", "08:00", Repeat::Daily);
        let b = Reminder::new("B", "08:00", Repeat::Daily);
        let c = Reminder::new("C", "08:00", Repeat::Daily);

        assert!(matches!(
            h.handle.trigger(TriggerRequest::scheduled(a.clone())).await.unwrap(),
            TriggerOutcome::Started { .. }
        ));
        assert_eq!(
            h.handle.trigger(TriggerRequest::scheduled(b.clone())).await.unwrap(),
            TriggerOutcome::Queued { position: 1 }
        );
        assert_eq!(
            h.handle.trigger(TriggerRequest::recall(a.clone(), 2)).await.unwrap(),
            TriggerOutcome::Coalesced
        );
        assert_eq!(
            h.handle.trigger(TriggerRequest::scheduled(b.clone())).await.unwrap(),
            TriggerOutcome::Coalesced
        );
        assert_eq!(
            h.handle.trigger(TriggerRequest::scheduled(c)).await,
            Err(CallError::QueueFull { capacity: 1 })
        );

        h.handle.decline().await.unwrap();
        let snapshot = h.handle.state().await.unwrap();
        assert_eq!(snapshot.state, CallState::Incoming);
        assert_eq!(snapshot.reminder_id, Some(b.id));
        assert_eq!(snapshot.queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_before_next_call() {
        let config = CallConfig {
            cooldown_ms: 2000,
            ring_timeout_secs: 0,
            ..Default::default()
        };
        let h = spawn(config, Arc::new(AcceptingVoice));
        let b = Reminder::new("B", "08:00", Repeat::Daily);
        h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap();
        h.handle.trigger(TriggerRequest::scheduled(b.clone())).await.unwrap();
        h.handle.decline().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Ended);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let snapshot = h.handle.state().await.unwrap();
        assert_eq!(snapshot.state, CallState::Incoming);
        assert_eq!(snapshot.reminder_id, Some(b.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ring_timeout_counts_as_missed() {
        let config = CallConfig {
            cooldown_ms: 0,
            ring_timeout_secs: 45,
            ..Default::default()
        };
        let mut h = spawn(config, Arc::new(AcceptingVoice));
        h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Incoming);

        let missed = wait_for_event(&mut h.events, "missed").await;
        assert!(matches!(missed, CallEvent::Missed { timed_out: true, .. }));
        assert_eq!(h.store.list_recalls().await.unwrap().len(), 1);
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Idle);
    }

    #[tokio::test]
    async fn test_stale_speech_signal_ignored() {
        let h = spawn(quiet_config(), Arc::new(AcceptingVoice));
        let call_id = match h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap() {
            TriggerOutcome::Started { call_id } => call_id,
            other => panic!("unexpected outcome {:?}", other),
        };
        h.handle.answer().await.unwrap();

        assert_eq!(
            h.handle.speech_ended_for("not-this-call", true).await,
            Err(CallError::StaleSignal {
                got: "not-this-call".to_string()
            })
        );
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Active);

        h.handle.speech_ended_for(&call_id, true).await.unwrap();
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_closes_ringing_call() {
        let mut h = spawn(quiet_config(), Arc::new(AcceptingVoice));
        h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap();
        h.handle.shutdown().await.unwrap();

        wait_for_event(&mut h.events, "missed").await;
        assert_eq!(only_entry(&h.store).await.outcome(), crate::domain::CallOutcome::Missed);
    }

    #[tokio::test]
    async fn test_shutdown_parks_queued_calls() {
        let h = spawn(quiet_config(), Arc::new(AcceptingVoice));
        let busy = Reminder::new("Busy", "08:00", Repeat::Daily);
        let dentist = Reminder::new("Dentist", "08:00", Repeat::Once);
        let bank = Reminder::new("Bank", "08:00", Repeat::Once);
        h.handle.trigger(TriggerRequest::scheduled(busy.clone())).await.unwrap();
        h.handle.trigger(TriggerRequest::scheduled(dentist.clone())).await.unwrap();
        h.handle.trigger(TriggerRequest::recall(bank.clone(), 3)).await.unwrap();
        assert_eq!(h.handle.state().await.unwrap().queued, 2);

        let before = now_ms();
        h.handle.shutdown().await.unwrap();
        while !h.handle.is_closed() {
            tokio::task::yield_now().await;
        }

        // Only the live call rang; the queued ones never reached history
        let entries = h.store.list_history(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reminder_id, busy.id);

        let dentist_row = h.store.get_recall(&dentist.id).await.unwrap().unwrap();
        assert_eq!(dentist_row.attempt, 1);
        assert!(dentist_row.due_at >= before && dentist_row.due_at <= now_ms());

        let bank_row = h.store.get_recall(&bank.id).await.unwrap().unwrap();
        assert_eq!(bank_row.attempt, 3);
        assert!(bank_row.is_due(now_ms()));

        // The declined live call still gets its ordinary backoff row
        let busy_row = h.store.get_recall(&busy.id).await.unwrap().unwrap();
        assert_eq!(busy_row.attempt, 2);
    }

    #[tokio::test]
    async fn test_hangup_ends_active_call() {
        let mut h = spawn(quiet_config(), Arc::new(AcceptingVoice));
        h.handle.trigger(TriggerRequest::scheduled(meds())).await.unwrap();
        h.handle.answer().await.unwrap();
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Active);

        tokio::time::sleep(Duration::from_millis(30)).await;
        h.handle.hangup().await.unwrap();
        assert_eq!(h.handle.state().await.unwrap().state, CallState::Idle);

        let entry = only_entry(&h.store).await;
        let answered_at = entry.answered_at.unwrap();
        let ended_at = entry.ended_at.unwrap();
        assert!(entry.answered);
        assert!(entry.voice_played);
        // Cut short by the user, so playback never completed
        assert!(!entry.voice_played_successfully);
        assert_eq!(entry.duration_ms, Some(ended_at - answered_at));
        assert!(entry.duration_ms.unwrap() >= 30);

        let spoken = wait_for_event(&mut h.events, "speaking_ended").await;
        assert!(matches!(spoken, CallEvent::SpeakingEnded { success: false, .. }));
        match wait_for_event(&mut h.events, "ended").await {
            CallEvent::Ended { call_id, duration_ms, .. } => {
                assert_eq!(call_id, entry.id);
                assert_eq!(Some(duration_ms), entry.duration_ms);
            }
            other => panic!("unexpected event {:?}", other),
        }
        wait_for_event(&mut h.events, "idle").await;
        assert!(h.handle.hangup().await.is_err());
    }
}
