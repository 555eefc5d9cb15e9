//! Paginated, cursor-following fetch of all records of one event type for one day.
//!
//! A walk issues page requests one after another. Each page gets its own retry
//! budget of `retry_sla` units, spent only on HTTP 502 responses. A page with
//! fewer records than `page_size` ends the walk; a full page continues it from
//! the id of its last record.
//!
//! # Navigation
//! - Entrypoints: [`PaginatedFetcher::fetch_all_for_day`], [`PaginatedFetcher::fetch_window`]
//! - Single page with retries: [`PaginatedFetcher::fetch_page`]

use tracing::{debug, error, info, warn};

use crate::config::{page_size_in_range, CursorBoundary, FetchSettings};
use crate::contract::{Cursor, EventsApi, FetchRequest, Record};
use crate::error::FetchError;

pub const STATUS_OK: u16 = 200;
/// Gateway timeout as reported by the API; the only transient status.
pub const STATUS_TRANSIENT: u16 = 502;

/// Records of one page and the retry units spent getting them.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub records: Vec<Record>,
    pub retries: u32,
}

/// Everything one walk produced, in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    pub records: Vec<Record>,
    /// Successful page responses.
    pub pages: u32,
    /// Retry units spent across all pages.
    pub retries: u32,
}

impl FetchResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct PaginatedFetcher<'a, A: EventsApi + ?Sized> {
    api: &'a A,
    settings: FetchSettings,
}

impl<'a, A: EventsApi + ?Sized> PaginatedFetcher<'a, A> {
    pub fn new(api: &'a A, settings: FetchSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// All records of `event_type` created on `day`, starting from the first page.
    pub async fn fetch_all_for_day(
        &self,
        event_type: &str,
        day: &str,
    ) -> Result<FetchResult, FetchError> {
        self.fetch_window(event_type, day, Cursor::default()).await
    }

    /// Walk starting from the cursors in `window`.
    ///
    /// `ending_before` stays on every page request of the walk; `starting_after`
    /// only seeds the first one and is then replaced page by page.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn fetch_window(
        &self,
        event_type: &str,
        day: &str,
        window: Cursor,
    ) -> Result<FetchResult, FetchError> {
        let page_size = self.settings.page_size;
        if !page_size_in_range(page_size) {
            error!(
                page_size,
                "page_size has to be between 10 and 100, inclusive; refusing to fetch"
            );
            return Err(FetchError::Validation { page_size });
        }

        let mut request = FetchRequest {
            day: day.to_string(),
            event_type: event_type.to_string(),
            page_size,
            starting_after: window.starting_after,
            ending_before: window.ending_before,
        };
        let mut result = FetchResult::default();

        loop {
            info!(
                event_type,
                starting_after = ?request.starting_after,
                ending_before = ?request.ending_before,
                "Updating cursor, fetching page"
            );
            let page = self.fetch_page(&request, self.settings.retry_sla).await?;
            result.pages += 1;
            result.retries += page.retries;
            let mut batch = page.records;
            info!(
                event_type,
                page = result.pages,
                records = batch.len(),
                retries = page.retries,
                "Page fetched"
            );

            if batch.len() < page_size as usize {
                info!(
                    event_type,
                    total_records = result.records.len() + batch.len(),
                    "Last page processed"
                );
                result.records.append(&mut batch);
                return Ok(result);
            }

            let last_index = batch.len() - 1;
            let next_cursor = batch[last_index].cursor_id().ok_or_else(|| {
                error!(
                    event_type,
                    index = last_index,
                    "Last record of a full page has no usable id"
                );
                FetchError::MissingCursor { index: last_index }
            })?;
            if self.settings.cursor_boundary == CursorBoundary::DropLast {
                batch.pop();
            }
            result.records.append(&mut batch);
            request = request.after(next_cursor);
        }
    }

    /// One page, re-issuing the identical request on 502 until `retry_sla` is spent.
    pub async fn fetch_page(
        &self,
        request: &FetchRequest,
        retry_sla: u32,
    ) -> Result<PageOutcome, FetchError> {
        let mut budget = retry_sla;
        let mut retries = 0;

        loop {
            let response = self.api.post_page(request).await.map_err(|e| {
                error!(error = %e, event_type = %request.event_type, "Page request failed without a response");
                e
            })?;

            match response.status {
                STATUS_OK => {
                    let records = decode_page(&response.body)?;
                    debug!(records = records.len(), "Successful API page call");
                    return Ok(PageOutcome { records, retries });
                }
                STATUS_TRANSIENT => {
                    if budget < 1 {
                        error!(
                            event_type = %request.event_type,
                            retries,
                            retry_sla,
                            "API still returns Gateway Timeout (502) after exhausting the retry budget"
                        );
                        return Err(FetchError::RetryExhausted {
                            retries,
                            last_status: STATUS_TRANSIENT,
                        });
                    }
                    budget -= 1;
                    retries += 1;
                    warn!(
                        event_type = %request.event_type,
                        remaining_retries = budget,
                        delay_ms = self.settings.retry_delay.as_millis() as u64,
                        "API returned Gateway Timeout (502); trying again"
                    );
                    if !self.settings.retry_delay.is_zero() {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
                status => {
                    error!(
                        event_type = %request.event_type,
                        status,
                        body = %response.body,
                        "Received error response from the API"
                    );
                    return Err(FetchError::Api {
                        status,
                        body: response.body,
                    });
                }
            }
        }
    }
}

/// Decodes a 200 body: a JSON array of records.
pub fn decode_page(body: &str) -> Result<Vec<Record>, FetchError> {
    serde_json::from_str::<Vec<Record>>(body).map_err(|e| {
        error!(error = %e, "API page body is not a JSON array of records");
        FetchError::Decode(e.to_string())
    })
}
