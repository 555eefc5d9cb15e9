//! # Events API client
//!
//! [`HttpEventsApi`] implements the core's [`EventsApi`] over reqwest: one POST per page,
//! the JSON request body sent as-is with the configured headers (including `x-api-key`).
//! Statuses are never interpreted here; the fetcher decides what 200, 502 and the rest mean.

use async_trait::async_trait;
use event_bucket_core::config::{IngestConfig, API_KEY_HEADER};
use event_bucket_core::contract::{EventsApi, FetchRequest, PageResponse};
use event_bucket_core::error::{ConfigError, FetchError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

pub struct HttpEventsApi {
    client: Client,
    url: String,
    headers: HeaderMap,
}

impl HttpEventsApi {
    pub fn new(config: &IngestConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.request_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::Invalid(format!("invalid header name {name:?}: {e}"))
            })?;
            let mut header_value = HeaderValue::from_str(value).map_err(|e| {
                ConfigError::Invalid(format!("invalid value for header {name:?}: {e}"))
            })?;
            if name.eq_ignore_ascii_case(API_KEY_HEADER) {
                header_value.set_sensitive(true);
            }
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            url = %config.api_url,
            header_count = headers.len(),
            "Initialized HttpEventsApi"
        );
        Ok(Self {
            client,
            url: config.api_url.clone(),
            headers,
        })
    }
}

#[async_trait]
impl EventsApi for HttpEventsApi {
    async fn post_page(&self, request: &FetchRequest) -> Result<PageResponse, FetchError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| FetchError::Transport(format!("failed to encode page request: {e}")))?;

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %self.url, "POST to events API failed");
                FetchError::Transport(e.to_string())
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            tracing::error!(error = ?e, status, "Failed to read events API response body");
            FetchError::Transport(format!("failed to read response body: {e}"))
        })?;
        tracing::debug!(status, bytes = text.len(), "Events API responded");

        Ok(PageResponse { status, body: text })
    }
}
