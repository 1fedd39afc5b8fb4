//! Call lifecycle
//!
//! A single call slot moves through `Idle -> Incoming -> Active -> Ended`
//! (or `Incoming -> Ended` when declined). The slot is owned by one actor
//! task; everything else talks to it through a `CallHandle`:
//! - **trigger:** ring for a reminder, or queue behind the live call
//! - **answer / decline / hangup:** user responses
//! - **speech_ended:** playback completion from the voice dispatcher

mod config;
mod events;
mod handle;
mod manager;
mod messages;
mod voice;

pub use config::CallConfig;
pub use events::{CallEvent, DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use handle::CallHandle;
pub use manager::CallManager;
pub use messages::{
    CallCommand, CallError, CallResult, CallSnapshot, CallState, TriggerOutcome, TriggerRequest, TriggerSource,
};
pub use voice::{CallPresenter, NoopPresenter, PlaybackRequest, PlaybackSource, SilentVoice, VoiceDispatcher, VoiceError};
