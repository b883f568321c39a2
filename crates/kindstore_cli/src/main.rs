//! KindStore CLI
//!
//! Command-line tools for KindStore database maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display per-kind store statistics
//! - `verify` - Replay every store log and report corruption
//! - `compact` - Rewrite every store with only its live entries

mod commands;
mod scan;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// KindStore command-line database tools.
#[derive(Parser)]
#[command(name = "kindstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database root directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display per-kind store statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay every store log and report corruption
    Verify,

    /// Compact every store found under the root
    Compact {
        /// Scratch directory for snapshots (default: <root>.tmp)
        #[arg(short, long)]
        tmp: Option<PathBuf>,

        /// Dry run - show what would be reclaimed
        #[arg(short, long)]
        dry_run: bool,
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

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { tmp, dry_run } => {
            let path = cli.path.ok_or("Database path required for compact")?;
            commands::compact::run(&path, tmp.as_deref(), dry_run)?;
        }
        Commands::Version => {
            println!("KindStore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("KindStore Core v{}", kindstore_core::VERSION);
        }
    }

    Ok(())
}
