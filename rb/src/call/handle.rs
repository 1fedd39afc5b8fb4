//! CallHandle - client interface to the call actor

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{CallCommand, CallError, CallResult, CallSnapshot, TriggerOutcome, TriggerRequest};

/// Cloneable way into the call actor
///
/// The scheduler, the recall checker, the voice dispatcher and user input all
/// go through a handle, so transitions are applied one at a time.
#[derive(Clone)]
pub struct CallHandle {
    tx: mpsc::Sender<CallCommand>,
}

impl CallHandle {
    pub(crate) fn new(tx: mpsc::Sender<CallCommand>) -> Self {
        Self { tx }
    }

    /// True once the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<CallResult<T>>) -> CallCommand) -> CallResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| CallError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CallError::ChannelClosed)?
    }

    /// Ring for a reminder, or queue behind the live call
    pub async fn trigger(&self, request: TriggerRequest) -> CallResult<TriggerOutcome> {
        debug!(reminder_id = %request.reminder.id, attempt = request.attempt, source = ?request.source, "CallHandle::trigger: called");
        self.request(|reply| CallCommand::Trigger { request, reply }).await
    }

    pub async fn answer(&self) -> CallResult<()> {
        debug!("CallHandle::answer: called");
        self.request(|reply| CallCommand::Answer { reply }).await
    }

    pub async fn decline(&self) -> CallResult<()> {
        debug!("CallHandle::decline: called");
        self.request(|reply| CallCommand::Decline { reply }).await
    }

    pub async fn hangup(&self) -> CallResult<()> {
        debug!("CallHandle::hangup: called");
        self.request(|reply| CallCommand::Hangup { reply }).await
    }

    /// Report the end of playback for whatever call is active
    pub async fn speech_ended(&self, success: bool) -> CallResult<()> {
        debug!(success, "CallHandle::speech_ended: called");
        self.request(|reply| CallCommand::SpeechEnded {
            call_id: None,
            success,
            reply,
        })
        .await
    }

    /// Report the end of playback for a specific call
    ///
    /// Ignored with `StaleSignal` if that call is no longer active.
    pub async fn speech_ended_for(&self, call_id: &str, success: bool) -> CallResult<()> {
        debug!(%call_id, success, "CallHandle::speech_ended_for: called");
        let call_id = Some(call_id.to_string());
        self.request(|reply| CallCommand::SpeechEnded {
            call_id,
            success,
            reply,
        })
        .await
    }

    pub async fn state(&self) -> CallResult<CallSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CallCommand::GetState { reply: reply_tx })
            .await
            .map_err(|_| CallError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CallError::ChannelClosed)
    }

    /// Ask the actor to stop
    pub async fn shutdown(&self) -> CallResult<()> {
        debug!("CallHandle::shutdown: called");
        self.tx
            .send(CallCommand::Shutdown)
            .await
            .map_err(|_| CallError::ChannelClosed)
    }
}
