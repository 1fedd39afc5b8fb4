use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use callstore::Store;
use callstore::cli::{Cli, Command};
use callstore::config::Config;

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store_path = cli.store.unwrap_or(config.store_path);

    info!("callstore opening {}", store_path.display());
    let mut store = Store::open(&store_path).context(format!("Failed to open store at {}", store_path.display()))?;

    match cli.command {
        Command::Collections => {
            let names = store.collection_names()?;
            if names.is_empty() {
                println!("No collections found");
            }
            for name in names {
                let stats = store.stats(&name)?;
                println!(
                    "{} {} rows {}",
                    name.cyan(),
                    stats.rows,
                    format!("({} log lines)", stats.log_lines).dimmed()
                );
            }
        }
        Command::List { collection } => {
            for row in store.list_raw(&collection)? {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
        Command::Compact { collection } => {
            let names = match collection {
                Some(name) => vec![name],
                None => store.collection_names()?,
            };
            for name in names {
                let stats = store.compact(&name)?;
                println!("{} Compacted {} to {} rows", "✓".green(), name.cyan(), stats.rows);
            }
        }
        Command::Delete { collection, id } => {
            if store.delete_in(&collection, &id)? {
                println!("{} Deleted {}/{}", "✓".green(), collection, id);
            } else {
                println!("{} No row {}/{}", "✗".red(), collection, id);
            }
        }
    }

    Ok(())
}
