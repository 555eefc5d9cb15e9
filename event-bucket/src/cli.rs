///
/// This module implements the CLI interface for event-bucket: command parsing, argument
/// validation and the async entrypoint used by both `main()` and the integration tests.
///
/// All fetching, batching and storage-layout logic lives in the [`event-bucket-core`] crate.
/// This module only wires the real collaborators (HTTP client, S3 sink) into it.
///
/// ## How To Use
/// - For command-line users: `event-bucket ingest [YYYY-MM-DD] --config <path>`; see `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`event-bucket-core`]: ../../event-bucket-core/
use crate::api::HttpEventsApi;
use crate::load_config::load_config;
use crate::storage::S3Sink;
use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use event_bucket_core::contract::Cursor;
use event_bucket_core::ingest::{ingest_day, IngestOptions};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "./config/event-bucket.yaml";

/// CLI for event-bucket: ingest a day of events into a bucket.
#[derive(Parser)]
#[clap(
    name = "event-bucket",
    version,
    about = "Ingest one day of events from a paginated API into an S3 bucket as newline-delimited JSON"
)]
pub struct Cli {
    /// Also append logs to this file
    #[clap(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every configured event type for one day and write each as one batch
    Ingest {
        /// Day to ingest, YYYY-MM-DD; defaults to today
        date: Option<NaiveDate>,

        /// Path to the YAML config file
        #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Start every walk after this record id
        #[clap(long)]
        starting_after: Option<String>,

        /// Bound every walk before this record id
        #[clap(long)]
        ending_before: Option<String>,

        /// Fetch (and mirror, if configured) without uploading to the bucket
        #[clap(long)]
        dry_run: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Ingest {
            date,
            config,
            starting_after,
            ending_before,
            dry_run,
        } => {
            let day = date
                .unwrap_or_else(|| Local::now().date_naive())
                .format("%Y-%m-%d")
                .to_string();
            tracing::info!(command = "ingest", day = %day, "Starting the ingestion");

            let config = load_config(config)?;
            config.trace_loaded();

            let api = HttpEventsApi::new(&config)?;
            // No sink means a dry run: fetch and mirror, skip the bucket.
            let sink = if dry_run {
                None
            } else {
                Some(S3Sink::new(&config.destination).await)
            };
            let options = IngestOptions {
                window: Cursor {
                    starting_after,
                    ending_before,
                },
            };

            let report = ingest_day(&config, &api, sink.as_ref(), &day, &options).await?;
            for done in &report.completed {
                tracing::info!(
                    event_type = %done.event_type,
                    records = done.records,
                    pages = done.pages,
                    retries = done.retries,
                    key = %done.object_key,
                    uploaded = done.uploaded,
                    "Event type complete"
                );
            }
            if !report.is_success() {
                for failed in &report.failures {
                    tracing::error!(event_type = %failed.event_type, error = %failed.error, "Event type failed");
                }
                anyhow::bail!(
                    "{} of {} event types failed for {}",
                    report.failures.len(),
                    config.event_types.len(),
                    day
                );
            }
            tracing::info!(
                command = "ingest",
                day = %day,
                total_records = report.total_records(),
                "Ingestion complete"
            );
            Ok(())
        }
    }
}
