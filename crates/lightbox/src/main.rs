//! Lightbox CLI - photo ingestion and enrichment pipeline.
//!
//! Lightbox turns a flat directory of camera JPEGs into a ready-to-serve
//! gallery: archival copies, compressed display crops, audited capture
//! metadata, and cached aesthetic ratings.
//!
//! # Usage
//!
//! ```bash
//! # Derive, audit, and score the configured source directory
//! lightbox ingest --reprocess
//!
//! # Replay the existing library without deriving or scoring
//! lightbox ingest
//!
//! # Re-score a specific directory, ignoring cached ratings
//! lightbox ingest --source ./photos --rescan-ratings
//!
//! # View configuration
//! lightbox config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Lightbox - photo ingestion and enrichment pipeline.
#[derive(Parser, Debug)]
#[command(name = "lightbox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest source photographs and emit the gallery manifest
    Ingest(cli::ingest::IngestArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging from config, with CLI verbose override.
    // Note: logging isn't initialized yet, so use eprintln for config warnings.
    let config = match lightbox_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `lightbox config path`."
            );
            lightbox_core::Config::default()
        }
    };
    logging::init(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Lightbox v{}", lightbox_core::VERSION);

    match cli.command {
        Commands::Ingest(args) => cli::ingest::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
