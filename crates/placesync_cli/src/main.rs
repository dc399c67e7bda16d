//! placesync CLI
//!
//! Command-line tools for placesync stores and staging areas.
//!
//! # Commands
//!
//! - `inspect` - Display local store statistics and places
//! - `compact` - Rewrite the place log without superseded frames
//! - `sweep` - Remove photos left by engines that exited uncleanly
//! - `stage` - Stage one photo the way a save would
//! - `demo` - Run a sync against an in-memory remote

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// placesync command-line tools.
#[derive(Parser)]
#[command(name = "placesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local store directory
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display local store statistics
    Inspect {
        /// List every place
        #[arg(short, long)]
        places: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Compact the place log
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Remove photos left by engines that exited uncleanly
    Sweep {
        /// Staging root (defaults to the engine's)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Downscale and re-encode a photo into the staging directory
    Stage {
        /// Photo to stage
        image: PathBuf,

        /// Staging root (defaults to the engine's)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Largest edge in pixels
        #[arg(short, long)]
        max_dimension: Option<u32>,
    },

    /// Sync sample places from an in-memory remote
    Demo {
        /// Number of remote places to create
        #[arg(short, long, default_value = "12")]
        count: usize,

        /// Records per page
        #[arg(short = 'p', long, default_value = "5")]
        page_size: u32,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { places, format } => {
            let path = cli.store.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, places, &format)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.store.ok_or("Store path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Sweep { dir } => {
            commands::sweep::run(dir)?;
        }
        Commands::Stage {
            image,
            dir,
            max_dimension,
        } => {
            commands::stage::run(&image, dir, max_dimension)?;
        }
        Commands::Demo { count, page_size } => {
            commands::demo::run(cli.store.as_deref(), count, page_size)?;
        }
        Commands::Version => {
            println!("placesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Row format v{}", placesync_codec::ROW_FORMAT_VERSION);
        }
    }

    Ok(())
}
