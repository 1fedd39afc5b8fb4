//! Terminal front end for `ringback run`
//!
//! `ConsolePresenter` prints calls, `SimulatedVoice` stands in for a speech
//! engine by waiting roughly as long as reading the text would take, and
//! `command_loop` turns stdin lines into answer/decline/hangup commands.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::call::{CallEvent, CallHandle, CallPresenter, EventBus, PlaybackRequest, PlaybackSource, VoiceDispatcher, VoiceError};
use crate::domain::{CallHistoryEntry, CallOutcome, Reminder};
use crate::recurrence::Zone;

/// Prints call progress to stdout
pub struct ConsolePresenter;

#[async_trait]
impl CallPresenter for ConsolePresenter {
    async fn on_trigger(&self, reminder: &Reminder, attempt: u32) {
        let retry = if attempt > 1 {
            format!(" (attempt {})", attempt)
        } else {
            String::new()
        };
        println!(
            "{} {}{}  [a]nswer / [d]ecline",
            "☎ Incoming:".bold().yellow(),
            reminder.title.bold(),
            retry.dimmed()
        );
    }

    async fn on_speaking_start(&self, reminder: &Reminder) {
        println!("{} {}", "▶".green(), reminder.speech_text());
    }

    async fn on_speaking_end(&self, _reminder: &Reminder) {
        println!("{}", "■ Finished speaking".dimmed());
    }

    async fn on_call_ended(&self, entry: &CallHistoryEntry) {
        match entry.outcome() {
            CallOutcome::Answered => println!(
                "{} {} ({}s)",
                "✓ Call ended:".green(),
                entry.title,
                entry.duration_ms.unwrap_or(0) / 1000
            ),
            _ => println!("{} {}", "✗ Missed:".red(), entry.title),
        }
    }
}

/// Speaking rate used to estimate playback length
pub const DEFAULT_WORDS_PER_MINUTE: u64 = 150;

const MIN_PLAYBACK: Duration = Duration::from_secs(1);
const MAX_PLAYBACK: Duration = Duration::from_secs(60);

/// Pretends to speak, then reports completion to the call actor
pub struct SimulatedVoice {
    calls: CallHandle,
    words_per_minute: u64,
}

impl SimulatedVoice {
    pub fn new(calls: CallHandle) -> Self {
        Self {
            calls,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
        }
    }

    pub fn with_words_per_minute(mut self, words_per_minute: u64) -> Self {
        self.words_per_minute = words_per_minute.max(1);
        self
    }

    /// How long playing `source` should take
    pub fn duration_for(&self, source: &PlaybackSource) -> Duration {
        let estimate = match source {
            // 16 kHz, 16-bit mono
            PlaybackSource::CustomAudio(audio) => Duration::from_millis(audio.len() as u64 / 32),
            PlaybackSource::Speech(text) => {
                let words = text.split_whitespace().count() as u64;
                Duration::from_millis(words * 60_000 / self.words_per_minute)
            }
        };
        estimate.clamp(MIN_PLAYBACK, MAX_PLAYBACK)
    }
}

#[async_trait]
impl VoiceDispatcher for SimulatedVoice {
    async fn start_playback(&self, request: PlaybackRequest) -> Result<(), VoiceError> {
        let duration = self.duration_for(&request.source);
        debug!(call_id = %request.call_id, ?duration, "SimulatedVoice::start_playback: called");

        let calls = self.calls.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Err(e) = calls.speech_ended_for(&request.call_id, true).await {
                debug!(call_id = %request.call_id, error = %e, "Playback finished after call ended");
            }
        });
        Ok(())
    }
}

/// Print the events the presenter does not cover
pub fn spawn_event_printer(events: Arc<EventBus>, zone: Zone) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(CallEvent::Queued { reminder_id, position }) => {
                    println!("{} {} (#{})", "… Queued:".dimmed(), reminder_id, position);
                }
                Ok(CallEvent::RecallScheduled { attempt, due_at, .. }) => {
                    println!("{} attempt {} at {}", "↻ Recall:".cyan(), attempt, zone.format(due_at));
                }
                Ok(CallEvent::RecallFailed { reminder_id, error, .. }) => {
                    println!("{} {}: {}", "! Recall not scheduled".yellow(), reminder_id, error);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// One line of user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Answer,
    Decline,
    Hangup,
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "answer" => Ok(Self::Answer),
            "d" | "decline" => Ok(Self::Decline),
            "h" | "hangup" => Ok(Self::Hangup),
            "s" | "status" => Ok(Self::Status),
            "?" | "help" => Ok(Self::Help),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other => Err(other.to_string()),
        }
    }
}

fn print_help() {
    println!("  a  answer    d  decline    h  hang up    s  status    q  quit");
}

/// Apply one command; returns false on quit
pub async fn apply(calls: &CallHandle, command: ConsoleCommand) -> Result<bool> {
    let result = match command {
        ConsoleCommand::Answer => calls.answer().await,
        ConsoleCommand::Decline => calls.decline().await,
        ConsoleCommand::Hangup => calls.hangup().await,
        ConsoleCommand::Status => {
            let snapshot = calls.state().await.context("Call actor is not running")?;
            match snapshot.reminder_id {
                Some(reminder_id) => println!(
                    "{} {} attempt {} ({} queued)",
                    snapshot.state.to_string().bold(),
                    reminder_id,
                    snapshot.attempt.unwrap_or(1),
                    snapshot.queued
                ),
                None => println!("{} ({} queued)", snapshot.state.to_string().bold(), snapshot.queued),
            }
            Ok(())
        }
        ConsoleCommand::Help => {
            print_help();
            Ok(())
        }
        ConsoleCommand::Quit => return Ok(false),
    };

    if let Err(e) = result {
        println!("{} {}", "!".yellow(), e);
    }
    Ok(true)
}

/// Forward stdin lines from a dedicated thread
///
/// A blocked read on the runtime's blocking pool would hold up shutdown, so
/// the thread is left detached and dies with the process.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Read commands from stdin until quit or end of input
pub async fn command_loop(calls: CallHandle) -> Result<()> {
    debug!("command_loop: called");
    print_help();
    let mut lines = spawn_stdin_reader();
    while let Some(line) = lines.recv().await {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ConsoleCommand>() {
            Ok(command) => {
                if !apply(&calls, command).await? {
                    break;
                }
            }
            Err(other) => println!("{} unknown command '{}', try ?", "!".yellow(), other),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallConfig, CallManager, CallState, TriggerRequest};
    use crate::domain::Repeat;
    use crate::recall::{RecallConfig, RecallLedger};
    use crate::store::{HistoryStore, MemoryStore};

    fn spawn_calls(store: &MemoryStore) -> CallHandle {
        let ledger = RecallLedger::new(Arc::new(store.clone()), RecallConfig::default());
        let config = CallConfig {
            cooldown_ms: 0,
            ring_timeout_secs: 0,
            ..Default::default()
        };
        let manager = CallManager::new(config, ledger, Arc::new(store.clone()));
        let calls = manager.handle();
        let manager = manager.with_voice(Arc::new(SimulatedVoice::new(calls.clone())));
        tokio::spawn(manager.run());
        calls
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("a".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Answer);
        assert_eq!(" Decline ".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Decline);
        assert_eq!("h".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Hangup);
        assert_eq!("exit".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Quit);
        assert_eq!("dance".parse::<ConsoleCommand>().unwrap_err(), "dance");
    }

    #[tokio::test]
    async fn test_playback_duration_is_clamped() {
        let store = MemoryStore::new();
        let voice = SimulatedVoice::new(spawn_calls(&store));

        let short = PlaybackSource::Speech("Reminder: Tea.".to_string());
        assert_eq!(voice.duration_for(&short), MIN_PLAYBACK);

        let words = vec!["word"; 300].join(" ");
        assert_eq!(voice.duration_for(&PlaybackSource::Speech(words)), MAX_PLAYBACK);

        let audio = PlaybackSource::CustomAudio(vec![0; 32 * 5000]);
        assert_eq!(voice.duration_for(&audio), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_voice_ends_the_call() {
        let store = MemoryStore::new();
        let calls = spawn_calls(&store);
        let reminder = Reminder::new("Take a walk", "17:00", Repeat::Daily);
        calls.trigger(TriggerRequest::manual(reminder)).await.unwrap();
        calls.answer().await.unwrap();
        assert_eq!(calls.state().await.unwrap().state, CallState::Active);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.state().await.unwrap().state, CallState::Idle);

        let entries = store.list_history(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].voice_played);
        assert!(entries[0].voice_played_successfully);
    }

    #[tokio::test]
    async fn test_apply_reports_invalid_transition_without_failing() {
        let store = MemoryStore::new();
        let calls = spawn_calls(&store);
        assert!(apply(&calls, ConsoleCommand::Answer).await.unwrap());
        assert!(apply(&calls, ConsoleCommand::Status).await.unwrap());
        assert!(!apply(&calls, ConsoleCommand::Quit).await.unwrap());
    }
}
