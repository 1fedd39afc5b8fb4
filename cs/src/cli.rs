//! CLI argument parsing for callstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "callstore")]
#[command(author, version, about = "Inspect and maintain a ringback record store", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides config)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List collections with row counts
    Collections,

    /// Print every row of a collection as JSON lines
    List {
        /// Collection name (reminders, recalls, history)
        #[arg(required = true)]
        collection: String,
    },

    /// Rewrite collection logs to one line per live row
    Compact {
        /// Collection to compact (default: all)
        collection: Option<String>,
    },

    /// Delete a row from a collection
    Delete {
        /// Collection name
        #[arg(required = true)]
        collection: String,

        /// Row id
        #[arg(required = true)]
        id: String,
    },
}
