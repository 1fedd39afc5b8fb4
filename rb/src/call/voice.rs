//! Presentation and playback collaborators
//!
//! The call actor drives a `CallPresenter` (whatever shows the call to the
//! user) and a `VoiceDispatcher` (whatever speaks the reminder). Playback
//! completion is reported back through `CallHandle::speech_ended`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CallHistoryEntry, Reminder};

/// What to play once a call is answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    /// Pre-recorded audio chosen by the user
    CustomAudio(Vec<u8>),
    /// Text to synthesize
    Speech(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub call_id: String,
    pub reminder_id: String,
    pub source: PlaybackSource,
}

impl PlaybackRequest {
    /// Custom audio when present and selected, else the spoken reminder
    pub fn for_reminder(call_id: impl Into<String>, reminder: &Reminder) -> Self {
        let source = match reminder.selected_audio() {
            Some(audio) => PlaybackSource::CustomAudio(audio.to_vec()),
            None => PlaybackSource::Speech(reminder.speech_text()),
        };
        Self {
            call_id: call_id.into(),
            reminder_id: reminder.id.clone(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error("No voice output available: {0}")]
    Unavailable(String),

    #[error("Playback failed: {0}")]
    Failed(String),
}

/// Starts playback for an answered call
///
/// Runs on the call actor's task: implementations must return once playback
/// has started and must not wait on the `CallHandle` from inside this call.
#[async_trait]
pub trait VoiceDispatcher: Send + Sync {
    async fn start_playback(&self, request: PlaybackRequest) -> Result<(), VoiceError>;
}

/// Shows the call to the user
#[async_trait]
pub trait CallPresenter: Send + Sync {
    async fn on_trigger(&self, reminder: &Reminder, attempt: u32);

    async fn on_speaking_start(&self, reminder: &Reminder);

    async fn on_speaking_end(&self, reminder: &Reminder);

    async fn on_call_ended(&self, entry: &CallHistoryEntry);
}

/// Presenter that shows nothing
pub struct NoopPresenter;

#[async_trait]
impl CallPresenter for NoopPresenter {
    async fn on_trigger(&self, _reminder: &Reminder, _attempt: u32) {}

    async fn on_speaking_start(&self, _reminder: &Reminder) {}

    async fn on_speaking_end(&self, _reminder: &Reminder) {}

    async fn on_call_ended(&self, _entry: &CallHistoryEntry) {}
}

/// Dispatcher for hosts without audio output; every playback fails to start
pub struct SilentVoice;

#[async_trait]
impl VoiceDispatcher for SilentVoice {
    async fn start_playback(&self, _request: PlaybackRequest) -> Result<(), VoiceError> {
        Err(VoiceError::Unavailable("no voice dispatcher configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Repeat;

    #[test]
    fn test_playback_prefers_selected_audio() {
        let reminder = Reminder::new("Meds", "08:00", Repeat::Daily).with_custom_audio(vec![7, 7]);
        let request = PlaybackRequest::for_reminder("c1", &reminder);
        assert_eq!(request.source, PlaybackSource::CustomAudio(vec![7, 7]));
        assert_eq!(request.reminder_id, reminder.id);
    }

    #[test]
    fn test_playback_falls_back_to_speech() {
        let mut reminder = Reminder::new("Meds", "08:00", Repeat::Daily).with_custom_audio(vec![7]);
        reminder.use_custom_audio = false;
        let request = PlaybackRequest::for_reminder("c1", &reminder);
        assert_eq!(request.source, PlaybackSource::Speech("Reminder: Meds.".to_string()));
    }

    #[tokio::test]
    async fn test_silent_voice_fails() {
        let reminder = Reminder::new("x", "08:00", Repeat::Once);
        let result = SilentVoice
            .start_playback(PlaybackRequest::for_reminder("c1", &reminder))
            .await;
        assert!(matches!(result, Err(VoiceError::Unavailable(_))));
    }
}
