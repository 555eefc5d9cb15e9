use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;

/// Inclusive bounds the API accepts for `limit`.
pub const MIN_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Header carrying the API secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// How a full page's last record is treated when moving to the next page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorBoundary {
    /// Keep all but the last record; it is expected back as the next page's first entry.
    #[default]
    DropLast,
    /// Keep the whole page; `starting_after` is strictly exclusive.
    KeepAll,
}

/// What the driver does when one event type fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Abort the run on the first failing event type.
    #[default]
    FailFast,
    /// Record the failure and carry on with the remaining event types.
    Continue,
}

/// Bucket and key prefix for finished batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub bucket: String,
    pub key_prefix: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub dir: PathBuf,
}

/// Parameters the paginated fetcher needs for one walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub page_size: u32,
    pub retry_sla: u32,
    pub retry_delay: Duration,
    pub cursor_boundary: CursorBoundary,
}

/// Read-only snapshot of everything one run needs. Built once, validated, then shared.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub api_url: String,
    pub request_headers: BTreeMap<String, String>,
    pub page_size: u32,
    pub retry_sla: u32,
    pub retry_delay: Duration,
    pub cursor_boundary: CursorBoundary,
    pub event_types: Vec<String>,
    pub destination: Destination,
    pub mirror: Option<MirrorConfig>,
    pub failure_mode: FailureMode,
    pub concurrency: usize,
}

impl IngestConfig {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            page_size: self.page_size,
            retry_sla: self.retry_sla,
            retry_delay: self.retry_delay,
            cursor_boundary: self.cursor_boundary,
        }
    }

    pub fn mirror_locally(&self) -> bool {
        self.mirror.is_some()
    }

    /// Structural checks on an assembled snapshot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api url is empty".into()));
        }
        if !page_size_in_range(self.page_size) {
            return Err(ConfigError::Invalid(format!(
                "page_size has to be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}, inclusive; it is set to {}",
                self.page_size
            )));
        }
        if !self
            .request_headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"))
        {
            return Err(ConfigError::Invalid(
                "request headers must include Content-Type".into(),
            ));
        }
        match self
            .request_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(API_KEY_HEADER))
        {
            Some((_, v)) if !v.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "request headers must include a non-empty {API_KEY_HEADER}"
                )))
            }
        }
        if let Some(empty) = self.event_types.iter().position(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "event type at position {empty} is empty"
            )));
        }
        if self.destination.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("destination bucket is empty".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            api_url = %self.api_url,
            page_size = self.page_size,
            retry_sla = self.retry_sla,
            retry_delay_ms = self.retry_delay.as_millis() as u64,
            event_types = ?self.event_types,
            bucket = %self.destination.bucket,
            key_prefix = %self.destination.key_prefix,
            mirror_locally = self.mirror_locally(),
            "Loaded IngestConfig"
        );
        // Headers carry the API key; never log their values.
        debug!(
            header_names = ?self.request_headers.keys().collect::<Vec<_>>(),
            cursor_boundary = ?self.cursor_boundary,
            failure_mode = ?self.failure_mode,
            concurrency = self.concurrency,
            "IngestConfig details"
        );
    }
}

pub fn page_size_in_range(page_size: u32) -> bool {
    (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size)
}
