//! # contract: data types and seams between the core and its collaborators
//!
//! The core never talks to the network or to object storage directly. It
//! calls two traits defined here:
//!
//! - [`EventsApi`]: issues one page request and returns the raw HTTP status
//!   and body. Implemented over reqwest in the binary crate.
//! - [`RecordSink`]: accepts one encoded batch under an object key.
//!   Implemented over S3 in the binary crate.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; the generated `MockEventsApi`
//!   and `MockRecordSink` are exported under the `test-export-mocks` feature
//!   so integration tests (and downstream crates) can script responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{FetchError, SinkError};

/// One page request. Built fresh for every page and discarded afterwards.
///
/// Serializes to the API's request body:
/// `{"created", "type", "limit", ["starting_after"], ["ending_before"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    #[serde(rename = "created")]
    pub day: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "limit")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ending_before: Option<String>,
}

impl FetchRequest {
    /// A request for the page following `starting_after`, keeping every other field.
    pub fn after(&self, starting_after: String) -> Self {
        Self {
            starting_after: Some(starting_after),
            ..self.clone()
        }
    }
}

/// Exclusive cursors bounding a walk. The default is an unbounded walk from the first page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub starting_after: Option<String>,
    pub ending_before: Option<String>,
}

/// An opaque event document. Only `id` is ever looked at; numbers keep their
/// original text, so a record encodes back exactly as it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub serde_json::Value);

impl Record {
    /// The record's `id` rendered as a cursor value, if it has a usable one.
    pub fn cursor_id(&self) -> Option<String> {
        match self.0.get("id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Record {
    fn from(value: serde_json::Value) -> Self {
        Record(value)
    }
}

/// Raw response to one page request, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Transport for page requests against the events API.
///
/// Implementors only move bytes: a response with any HTTP status is `Ok`.
/// `Err` is reserved for requests that produced no response at all.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait EventsApi: Send + Sync {
    /// POST one page request and return its status and body.
    async fn post_page(&self, request: &FetchRequest) -> Result<PageResponse, FetchError>;
}

/// Destination for one finished batch per event type and day.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Store `body` under `key` in `bucket`, replacing any existing object.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), SinkError>;
}
