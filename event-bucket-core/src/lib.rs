#![doc = "event-bucket-core: core logic library for event-bucket."]

//! This crate holds the data model, the paginated fetcher, the storage layout
//! rules and the ingest driver. Network and object-storage clients are plugged
//! in through the traits in [`contract`]; the `event-bucket` crate provides the
//! real ones.
//!
//! # Usage
//! Build an [`config::IngestConfig`], pick an [`contract::EventsApi`] and a
//! [`contract::RecordSink`], then call [`ingest::ingest_day`]. For a single
//! walk without storage, use [`fetch::PaginatedFetcher`] directly.

pub mod config;
pub mod contract;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod sink;
