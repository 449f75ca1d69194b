//! # Docsilo CLI (`silo`)
//!
//! The `silo` binary drives the ingestion pipeline from the command line.
//!
//! ## Usage
//!
//! ```bash
//! silo --config ./config/silo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `silo init` | Create the SQLite database and run schema migrations |
//! | `silo ingest <path>` | Ingest a file or every file under a directory |
//! | `silo jobs` | Show pending job counts per queue |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! silo init --config ./config/silo.toml
//!
//! # Ingest a single file
//! silo ingest ./inbox/report.docx
//!
//! # Ingest a directory into a project, with accurate OCR for scans
//! silo ingest ./inbox --project acme --ocr-mode accurate
//!
//! # Inspect queue depth
//! silo jobs
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use docsilo::ingest::{run_ingest, IngestPipeline};
use docsilo::models::OcrMode;
use docsilo::queue::SqliteQueue;
use docsilo::store::SqliteStore;
use docsilo::{config, db, migrate};

/// Docsilo CLI — a deduplicating document ingestion pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/silo.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "silo",
    about = "Docsilo — a deduplicating document ingestion pipeline",
    version,
    long_about = "Docsilo fingerprints and deduplicates inbound files, extracts and chunks \
    text-native formats, converts everything else to PDF, and hands work to downstream \
    OCR and embedding stages via durable SQLite-backed job queues."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/silo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, minidocs, chunks, detector artifacts, jobs).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest a file, or every file under a directory.
    ///
    /// Duplicates are set aside in `processed/`, failures are quarantined
    /// in `failed/` next to their inbound location and logged to
    /// `errors.log` there.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Project to attach ingested documents to.
        #[arg(long)]
        project: Option<String>,

        /// OCR mode carried in split jobs: `fast` or `accurate`.
        /// Defaults to the configured `ocr.mode`.
        #[arg(long)]
        ocr_mode: Option<OcrMode>,
    },

    /// Show pending job counts per queue.
    Jobs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docsilo=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            project,
            ocr_mode,
        } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let store = SqliteStore::new(pool.clone());
            let queue = Arc::new(SqliteQueue::new(pool));
            let pipeline = IngestPipeline::new(store, queue, &cfg);

            let report = run_ingest(&pipeline, &path, project.as_deref(), ocr_mode).await?;
            println!(
                "Ingested {} file(s): {} embedded, {} handed off, {} duplicates, {} quarantined.",
                report.total(),
                report.embedded,
                report.handed_off,
                report.duplicates,
                report.quarantined
            );
        }
        Commands::Jobs => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let queue = SqliteQueue::new(pool);
            for (name, count) in queue.pending_counts().await? {
                println!("{:<10} {}", name.as_str(), count);
            }
        }
    }

    Ok(())
}
