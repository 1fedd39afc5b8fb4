//! Call lifecycle events
//!
//! The call actor emits a `CallEvent` for every transition. Any number of
//! observers (console, log writers, tests) subscribe through the `EventBus`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use super::messages::TriggerSource;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Something that happened to the call slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    /// A reminder started ringing
    Incoming {
        call_id: String,
        reminder_id: String,
        title: String,
        attempt: u32,
        source: TriggerSource,
    },

    /// A trigger is waiting for the slot
    Queued { reminder_id: String, position: usize },

    Answered { call_id: String, reminder_id: String },

    SpeakingStarted { call_id: String, reminder_id: String },

    SpeakingEnded {
        call_id: String,
        reminder_id: String,
        success: bool,
    },

    /// Declined, or left ringing until the ring timeout
    Missed {
        call_id: String,
        reminder_id: String,
        attempt: u32,
        timed_out: bool,
    },

    /// An answered call finished
    Ended {
        call_id: String,
        reminder_id: String,
        duration_ms: i64,
    },

    RecallScheduled {
        reminder_id: String,
        attempt: u32,
        due_at: i64,
    },

    /// A missed call could not be given a recall
    RecallFailed {
        reminder_id: String,
        attempt: u32,
        error: String,
    },

    /// The slot is free again
    Idle,
}

impl CallEvent {
    /// Short name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Incoming { .. } => "incoming",
            Self::Queued { .. } => "queued",
            Self::Answered { .. } => "answered",
            Self::SpeakingStarted { .. } => "speaking_started",
            Self::SpeakingEnded { .. } => "speaking_ended",
            Self::Missed { .. } => "missed",
            Self::Ended { .. } => "ended",
            Self::RecallScheduled { .. } => "recall_scheduled",
            Self::RecallFailed { .. } => "recall_failed",
            Self::Idle => "idle",
        }
    }

    pub fn reminder_id(&self) -> Option<&str> {
        match self {
            Self::Incoming { reminder_id, .. }
            | Self::Queued { reminder_id, .. }
            | Self::Answered { reminder_id, .. }
            | Self::SpeakingStarted { reminder_id, .. }
            | Self::SpeakingEnded { reminder_id, .. }
            | Self::Missed { reminder_id, .. }
            | Self::Ended { reminder_id, .. }
            | Self::RecallScheduled { reminder_id, .. }
            | Self::RecallFailed { reminder_id, .. } => Some(reminder_id),
            Self::Idle => None,
        }
    }
}

/// Broadcast channel for call events
pub struct EventBus {
    tx: broadcast::Sender<CallEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: without subscribers the event is dropped.
    pub fn emit(&self, event: CallEvent) {
        debug!(
            event_type = event.event_type(),
            reminder_id = event.reminder_id(),
            "EventBus::emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(CallEvent::Idle);
        bus.emit(CallEvent::Answered {
            call_id: "c1".to_string(),
            reminder_id: "r1".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap(), CallEvent::Idle);
        let answered = rx.recv().await.unwrap();
        assert_eq!(answered.event_type(), "answered");
        assert_eq!(answered.reminder_id(), Some("r1"));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::with_default_capacity();
        bus.emit(CallEvent::Idle);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = CallEvent::RecallScheduled {
            reminder_id: "r1".to_string(),
            attempt: 2,
            due_at: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "recall_scheduled");
        assert_eq!(json["attempt"], 2);
    }
}
