//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::{MINUTE_MS, Repeat};

/// Ringback - reminders that call you back until you pick up
#[derive(Parser)]
#[command(
    name = "ringback",
    about = "Reminders that ring like a phone call and call back when missed",
    version,
    after_help = "Logs are written to: ~/.local/share/ringback/logs/ringback.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (overrides config)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the engine in the foreground and take call commands from stdin
    Run {
        /// Keep everything in memory instead of the store directory
        #[arg(long)]
        ephemeral: bool,
    },

    /// Add a reminder
    Add {
        /// What to remind about
        title: String,

        /// Time of day, HH:MM
        #[arg(short, long)]
        time: String,

        /// How often it repeats
        #[arg(short, long, value_enum, default_value = "once")]
        repeat: RepeatArg,

        /// Repeat every N minutes instead (anchored to --time)
        #[arg(long, conflicts_with = "repeat")]
        every_minutes: Option<u64>,

        /// Why it matters; read out after the title
        #[arg(long)]
        reason: Option<String>,
    },

    /// List reminders
    List,

    /// Remove a reminder and any recall pending for it
    Remove {
        /// Reminder ID (prefix or slug fragment)
        id: String,
    },

    /// Show call history
    History {
        /// Only calls for this reminder
        #[arg(long)]
        reminder: Option<String>,
    },

    /// Show pending recalls
    Recalls,

    /// Preview upcoming fire times for a reminder
    Next {
        /// Reminder ID (prefix or slug fragment)
        id: String,

        /// How many occurrences to show
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
}

/// Built-in repeat kinds accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RepeatArg {
    Once,
    Hourly,
    Daily,
    Weekly,
}

impl From<RepeatArg> for Repeat {
    fn from(arg: RepeatArg) -> Self {
        match arg {
            RepeatArg::Once => Repeat::Once,
            RepeatArg::Hourly => Repeat::Hourly,
            RepeatArg::Daily => Repeat::Daily,
            RepeatArg::Weekly => Repeat::Weekly,
        }
    }
}

/// Repeat rule for `add`, with `--every-minutes` taking precedence
pub fn repeat_from_args(repeat: RepeatArg, every_minutes: Option<u64>) -> Repeat {
    match every_minutes {
        Some(minutes) => Repeat::every(minutes as i64 * MINUTE_MS),
        None => repeat.into(),
    }
}
