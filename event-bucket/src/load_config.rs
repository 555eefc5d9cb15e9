/// `load_config` module: Loads a static YAML config, injects the API key from the environment and
/// produces the validated [`IngestConfig`] snapshot for one run.
///
/// This module is the only place where untrusted YAML is parsed and mapped to strongly-typed
/// internal structs.
///
/// # Responsibilities
/// - Parse the YAML file into intermediate section structs
/// - Read the API key from the environment variable named by `api.api_key_env` (default `API_KEY`)
///   and fail right away when it is missing or empty
/// - Convert seconds to a `Duration`, fill defaults for optional sections
/// - Run [`IngestConfig::validate`] before handing the snapshot out
///
/// # Errors
/// Every failure is a [`ConfigError`]; the CLI surfaces it through `anyhow`.
///
/// For the accepted YAML schema, see `config/event-bucket.yaml`.
use event_bucket_core::config::{
    CursorBoundary, Destination, FailureMode, IngestConfig, MirrorConfig, API_KEY_HEADER,
};
use event_bucket_core::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_API_KEY_ENV: &str = "API_KEY";

#[derive(Debug, Deserialize)]
struct RawConfig {
    api: ApiSection,
    pagination: PaginationSection,
    retry: RetrySection,
    destination: Destination,
    #[serde(default)]
    mirror: Option<MirrorConfig>,
    #[serde(default)]
    run: RunSection,
    events: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSection {
    url: String,
    headers: BTreeMap<String, String>,
    #[serde(default = "default_api_key_env")]
    api_key_env: String,
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

#[derive(Debug, Deserialize)]
struct PaginationSection {
    page_size: u32,
    #[serde(default)]
    cursor_boundary: CursorBoundary,
}

#[derive(Debug, Deserialize)]
struct RetrySection {
    retry_sla: u32,
    retry_delay_secs: f64,
}

#[derive(Debug, Deserialize)]
struct RunSection {
    #[serde(default)]
    failure_mode: FailureMode,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::default(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// Loads a static YAML config file (no secrets) and injects the API key from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<IngestConfig, ConfigError> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(ConfigError::Read {
                path: path_ref.display().to_string(),
                message: e.to_string(),
            });
        }
    };

    parse_config(&config_content)
}

/// Same as [`load_config`], from YAML text.
pub fn parse_config(content: &str) -> Result<IngestConfig, ConfigError> {
    let raw: RawConfig = match serde_yaml::from_str(content) {
        Ok(conf) => {
            info!("Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, "Failed to parse config YAML");
            return Err(ConfigError::Parse(e.to_string()));
        }
    };

    let api_key = match std::env::var(&raw.api.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            info!(var = %raw.api.api_key_env, "API key found in env");
            key
        }
        _ => {
            error!(var = %raw.api.api_key_env, "API key environment variable not set or empty");
            return Err(ConfigError::MissingSecret(raw.api.api_key_env));
        }
    };

    let retry_delay = Duration::try_from_secs_f64(raw.retry.retry_delay_secs).map_err(|e| {
        error!(error = %e, retry_delay_secs = raw.retry.retry_delay_secs, "Invalid retry delay");
        ConfigError::Invalid(format!(
            "retry_delay_secs must be a non-negative number of seconds, got {}: {e}",
            raw.retry.retry_delay_secs
        ))
    })?;

    let mut request_headers: BTreeMap<String, String> = raw
        .api
        .headers
        .into_iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(API_KEY_HEADER))
        .collect();
    request_headers.insert(API_KEY_HEADER.to_string(), api_key);

    let config = IngestConfig {
        api_url: raw.api.url,
        request_headers,
        page_size: raw.pagination.page_size,
        retry_sla: raw.retry.retry_sla,
        retry_delay,
        cursor_boundary: raw.pagination.cursor_boundary,
        event_types: raw.events,
        destination: raw.destination,
        mirror: raw.mirror,
        failure_mode: raw.run.failure_mode,
        concurrency: raw.run.concurrency,
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "Config failed validation");
        return Err(e);
    }

    info!(
        event_types = config.event_types.len(),
        bucket = %config.destination.bucket,
        "Config loaded and merged successfully"
    );
    Ok(config)
}
