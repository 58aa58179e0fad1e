//! Satchel CLI
//!
//! Command-line tools for Satchel store management.
//!
//! # Commands
//!
//! - `backup` - Export the full store state to an encrypted blob
//! - `restore` - Restore a store from a backup blob
//! - `inspect` - List collections and record counts
//! - `stats` - Display storage statistics
//! - `cleanup` - Purge records older than a threshold

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Satchel command-line store tools.
#[derive(Parser)]
#[command(name = "satchel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Encryption passphrase for the store
    #[arg(global = true, short, long)]
    key: Option<String>,

    /// Operate on this user's namespace
    #[arg(global = true, short, long)]
    user: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the full store state to an encrypted backup file
    Backup {
        /// Where to write the backup blob
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Restore a store from a backup file
    Restore {
        /// The backup blob to restore from
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List collections and record counts
    Inspect {
        /// Show record ids of a single collection
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Display storage statistics
    Stats,

    /// Purge records older than the given age
    Cleanup {
        /// Maximum record age in days
        #[arg(short, long)]
        days: u32,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if matches!(cli.command, Commands::Version) {
        println!("Satchel CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.path.ok_or("Store path required (--path)")?;
    let key = cli.key.ok_or("Encryption passphrase required (--key)")?;
    let store = commands::open_store(&path, &key, cli.user.as_deref())?;

    match cli.command {
        Commands::Backup { output } => commands::backup::create(&store, &output)?,
        Commands::Restore { input } => commands::backup::restore(&store, &input)?,
        Commands::Inspect { collection } => {
            commands::inspect::run(&store, collection.as_deref())?;
        }
        Commands::Stats => commands::inspect::stats(&store)?,
        Commands::Cleanup { days } => commands::cleanup::run(&store, days)?,
        Commands::Version => unreachable!("handled above"),
    }

    Ok(())
}
