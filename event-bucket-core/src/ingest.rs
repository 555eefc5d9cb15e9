//! High-level pipeline: fetch → mirror → upload, once per configured event type.
//!
//! For every event type in the config, in order, the driver:
//!   - walks all pages of that type for the day via [`PaginatedFetcher`]
//!   - writes the batch to the local mirror when one is configured
//!   - submits the batch as one NDJSON object to the [`RecordSink`], unless
//!     no sink was given (dry run)
//!
//! # Failure handling
//! With [`FailureMode::FailFast`] the first failing event type aborts the run;
//! batches of event types that finished before it stay written. With
//! [`FailureMode::Continue`] failures are collected in the report and the
//! remaining event types still run.
//!
//! # Concurrency
//! `concurrency` event types are walked at once. Reports always come back in
//! configured order and every page fetch owns its retry budget.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::{Destination, FailureMode, IngestConfig};
use crate::contract::{Cursor, EventsApi, RecordSink};
use crate::error::{EventTypeError, IngestError};
use crate::fetch::PaginatedFetcher;
use crate::sink::{encode_ndjson, object_key, LocalMirror};

/// Per-run knobs that are not part of the config file.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Cursors applied to every event type's walk.
    pub window: Cursor,
}

#[derive(Debug)]
pub struct IngestReport {
    pub day: String,
    pub completed: Vec<EventTypeReport>,
    pub failures: Vec<EventTypeFailure>,
}

impl IngestReport {
    pub fn total_records(&self) -> usize {
        self.completed.iter().map(|r| r.records).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct EventTypeReport {
    pub event_type: String,
    pub records: usize,
    pub pages: u32,
    pub retries: u32,
    pub object_key: String,
    pub uploaded: bool,
    pub mirror_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct EventTypeFailure {
    pub event_type: String,
    pub error: EventTypeError,
}

#[tracing::instrument(level = "info", skip(config, api, sink, options))]
pub async fn ingest_day<A, S>(
    config: &IngestConfig,
    api: &A,
    sink: Option<&S>,
    day: &str,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError>
where
    A: EventsApi + ?Sized,
    S: RecordSink + ?Sized,
{
    config.validate()?;
    info!(
        day,
        event_types = ?config.event_types,
        dry_run = sink.is_none(),
        "Starting the ingestion"
    );

    let fetcher = PaginatedFetcher::new(api, config.fetch_settings());
    let mirror = config.mirror.as_ref().map(|m| LocalMirror::new(&m.dir));
    let fetcher = &fetcher;
    let mirror = mirror.as_ref();
    let destination = &config.destination;

    let mut outcomes = stream::iter(config.event_types.iter())
        .map(move |event_type| async move {
            let outcome =
                ingest_event_type(fetcher, destination, sink, mirror, day, event_type, options)
                    .await;
            (event_type, outcome)
        })
        .buffered(config.concurrency);

    let mut report = IngestReport {
        day: day.to_string(),
        completed: Vec::new(),
        failures: Vec::new(),
    };

    while let Some((event_type, outcome)) = outcomes.next().await {
        match outcome {
            Ok(done) => report.completed.push(done),
            Err(e) => match config.failure_mode {
                FailureMode::FailFast => {
                    error!(event_type = %event_type, error = %e, "Event type failed; aborting run");
                    return Err(IngestError::EventType {
                        event_type: event_type.clone(),
                        source: e,
                    });
                }
                FailureMode::Continue => {
                    warn!(event_type = %event_type, error = %e, "Event type failed; continuing with the rest");
                    report.failures.push(EventTypeFailure {
                        event_type: event_type.clone(),
                        error: e,
                    });
                }
            },
        }
    }

    info!(
        day,
        completed = report.completed.len(),
        failed = report.failures.len(),
        total_records = report.total_records(),
        "Ingestion finished"
    );
    Ok(report)
}

async fn ingest_event_type<A, S>(
    fetcher: &PaginatedFetcher<'_, A>,
    destination: &Destination,
    sink: Option<&S>,
    mirror: Option<&LocalMirror>,
    day: &str,
    event_type: &str,
    options: &IngestOptions,
) -> Result<EventTypeReport, EventTypeError>
where
    A: EventsApi + ?Sized,
    S: RecordSink + ?Sized,
{
    info!(event_type, day, "Starting to load event type");
    let fetched = fetcher
        .fetch_window(event_type, day, options.window.clone())
        .await?;

    let mirror_path = match mirror {
        Some(mirror) => Some(mirror.write(event_type, day, &fetched.records)?),
        None => None,
    };

    let key = object_key(&destination.key_prefix, event_type, day, fetched.len());
    let uploaded = match sink {
        None => {
            info!(event_type, key = %key, records = fetched.len(), "Dry run; skipping bucket upload");
            false
        }
        Some(sink) => {
            let body = encode_ndjson(&fetched.records)?;
            info!(
                event_type,
                bucket = %destination.bucket,
                key = %key,
                records = fetched.len(),
                bytes = body.len(),
                "Writing partitioned batch to bucket"
            );
            sink.put_object(&destination.bucket, &key, body).await?;
            true
        }
    };

    Ok(EventTypeReport {
        event_type: event_type.to_string(),
        records: fetched.len(),
        pages: fetched.pages,
        retries: fetched.retries,
        object_key: key,
        uploaded,
        mirror_path,
    })
}
