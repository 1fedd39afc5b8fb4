//! Ringback - reminders that call you back
//!
//! CLI entry point for running the engine and managing reminders.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use callstore::now_ms;
use ringback::call::VoiceDispatcher;
use ringback::cli::{Cli, Command, RepeatArg, repeat_from_args};
use ringback::config::Config;
use ringback::console::{self, ConsolePresenter, SimulatedVoice};
use ringback::domain::{Reminder, resolve_id};
use ringback::recurrence::{MAX_UPCOMING, Zone, parse_time_of_day};
use ringback::runtime::Runtime;
use ringback::store::{HistoryStore, MemoryStore, RecallStore, ReminderStore, StoreManager, Stores};

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ringback")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level: tracing::Level = level
        .parse()
        .map_err(|_| eyre::eyre!("Invalid log level '{}'", level))?;
    let log_file = fs::File::create(log_dir.join("ringback.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging: CLI flag, then config, then INFO
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    config.validate().context("Invalid configuration")?;
    info!(timezone = %config.timezone, store = %config.storage.path, "Ringback loaded config");

    // Dispatch command
    match cli.command {
        Command::Run { ephemeral } => cmd_run(&config, cli.config.as_ref(), ephemeral).await,
        Command::Add {
            title,
            time,
            repeat,
            every_minutes,
            reason,
        } => cmd_add(&config, title, time, repeat, every_minutes, reason).await,
        Command::List => cmd_list(&config).await,
        Command::Remove { id } => cmd_remove(&config, &id).await,
        Command::History { reminder } => cmd_history(&config, reminder.as_deref()).await,
        Command::Recalls => cmd_recalls(&config).await,
        Command::Next { id, count } => cmd_next(&config, &id, count).await,
    }
}

fn open_store(config: &Config) -> Result<StoreManager> {
    let path = config.storage.expanded_path();
    StoreManager::spawn(&path).context(format!("Failed to open store at {}", path.display()))
}

async fn find_reminder(store: &StoreManager, reference: &str) -> Result<Reminder> {
    let reminders = store.list_reminders().await?;
    let id = match resolve_id(reminders.iter().map(|r| r.id.as_str()), reference) {
        Ok(Some(id)) => id,
        Ok(None) => return Err(eyre::eyre!("No reminder matches '{}'", reference)),
        Err(candidates) => {
            return Err(eyre::eyre!(
                "'{}' is ambiguous: {}",
                reference,
                candidates.join(", ")
            ));
        }
    };
    reminders
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| eyre::eyre!("No reminder matches '{}'", reference))
}

/// Run the engine until quit, end of input or Ctrl-C
async fn cmd_run(config: &Config, config_path: Option<&PathBuf>, ephemeral: bool) -> Result<()> {
    let store = if ephemeral { None } else { Some(open_store(config)?) };
    let stores = match &store {
        Some(store) => Stores::shared(store.clone()),
        None => Stores::shared(MemoryStore::new()),
    };

    let runtime = Runtime::start(config, stores, Arc::new(ConsolePresenter), |calls| {
        Arc::new(SimulatedVoice::new(calls)) as Arc<dyn VoiceDispatcher>
    })?;
    let printer = console::spawn_event_printer(runtime.events(), runtime.zone());
    println!("{} timezone {}", "Ringback running,".green(), runtime.zone());

    let mut input = tokio::spawn(console::command_loop(runtime.calls().clone()));
    let mut hangups = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            finished = &mut input => {
                match finished {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Command loop failed"),
                    Err(e) => warn!(error = %e, "Command loop panicked"),
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                input.abort();
                break;
            }
            _ = hangups.recv() => {
                info!("SIGHUP received, reloading config");
                match Config::load(config_path) {
                    Ok(fresh) => match runtime.reload(&fresh).await {
                        Ok(cancelled) => println!("{} ({} recalls cancelled)", "Config reloaded".green(), cancelled),
                        Err(e) => println!("{} {:#}", "Reload rejected:".yellow(), e),
                    },
                    Err(e) => println!("{} {:#}", "Reload failed:".yellow(), e),
                }
            }
        }
    }

    runtime.shutdown().await;
    printer.abort();
    if let Some(store) = store {
        store.shutdown().await?;
    }
    println!("Stopped");
    Ok(())
}

async fn cmd_add(
    config: &Config,
    title: String,
    time: String,
    repeat: RepeatArg,
    every_minutes: Option<u64>,
    reason: Option<String>,
) -> Result<()> {
    parse_time_of_day(&time)?;
    if every_minutes == Some(0) {
        return Err(eyre::eyre!("--every-minutes must be greater than zero"));
    }
    let zone = config.zone()?;

    let mut reminder = Reminder::new(title, time, repeat_from_args(repeat, every_minutes));
    if let Some(reason) = reason {
        reminder = reminder.with_reason(reason);
    }
    let next = zone.next_trigger(&reminder, now_ms());
    reminder.reschedule(next);

    let store = open_store(config)?;
    store.put_reminder(reminder.clone()).await?;
    store.shutdown().await?;

    println!(
        "{} {} ({}, next {})",
        "✓ Added".green(),
        reminder.id.cyan(),
        reminder.repeat,
        zone.format(reminder.next_trigger)
    );
    Ok(())
}

async fn cmd_list(config: &Config) -> Result<()> {
    let zone = config.zone()?;
    let store = open_store(config)?;
    let mut reminders = store.list_reminders().await?;
    store.shutdown().await?;

    if reminders.is_empty() {
        println!("No reminders");
        return Ok(());
    }

    reminders.sort_by_key(|r| (!r.active, r.next_trigger));
    for reminder in reminders {
        let next = if reminder.active {
            zone.format(reminder.next_trigger)
        } else {
            "inactive".dimmed().to_string()
        };
        println!(
            "{}  {}  {} {}  next {}",
            reminder.id.cyan(),
            reminder.title.bold(),
            reminder.time,
            reminder.repeat,
            next
        );
    }
    Ok(())
}

async fn cmd_remove(config: &Config, reference: &str) -> Result<()> {
    let store = open_store(config)?;
    let reminder = find_reminder(&store, reference).await?;

    store.delete_reminder(&reminder.id).await?;
    let had_recall = store.delete_recall(&reminder.id).await?;
    store.shutdown().await?;

    println!("{} {}", "✓ Removed".green(), reminder.id);
    if had_recall {
        println!("  pending recall cancelled");
    }
    Ok(())
}

async fn cmd_history(config: &Config, reminder: Option<&str>) -> Result<()> {
    let zone = config.zone()?;
    let store = open_store(config)?;
    let reminder_id = match reminder {
        Some(reference) => Some(find_reminder(&store, reference).await?.id),
        None => None,
    };
    let entries = store.list_history(reminder_id.as_deref()).await?;
    store.shutdown().await?;

    if entries.is_empty() {
        println!("No calls yet");
        return Ok(());
    }

    for entry in entries {
        let duration = entry
            .duration_ms
            .map(|ms| format!("{}s", ms / 1000))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {}  attempt {}  {}",
            zone.format(entry.triggered_at),
            entry.title.bold(),
            entry.outcome(),
            entry.attempt,
            duration
        );
    }
    Ok(())
}

async fn cmd_recalls(config: &Config) -> Result<()> {
    let zone = config.zone()?;
    let store = open_store(config)?;
    let recalls = store.due_recalls(i64::MAX).await?;
    store.shutdown().await?;

    if recalls.is_empty() {
        println!("No pending recalls");
        return Ok(());
    }

    for recall in recalls {
        println!(
            "{}  {}  attempt {}  due {}",
            recall.reminder_id.cyan(),
            recall.reminder.title.bold(),
            recall.attempt,
            zone.format(recall.due_at)
        );
    }
    Ok(())
}

async fn cmd_next(config: &Config, reference: &str, count: usize) -> Result<()> {
    let zone: Zone = config.zone()?;
    let store = open_store(config)?;
    let reminder = find_reminder(&store, reference).await?;
    store.shutdown().await?;

    if count > MAX_UPCOMING {
        println!("{}", format!("Showing the first {} occurrences", MAX_UPCOMING).dimmed());
    }
    let count = count.min(MAX_UPCOMING);
    println!("{} ({} at {})", reminder.title.bold(), reminder.repeat, reminder.time);
    for at in zone.upcoming(&reminder, now_ms(), count) {
        println!("  {}", zone.format(at));
    }
    Ok(())
}
