//! # naas-enrichment
//!
//! The Enricher (spec §4.2): joins `AnomalyDetected` with historical context
//! from the columnar store across four concurrent, independently-timed-out
//! queries, emitting `AnomalyEnriched`. Generalizes
//! `sentinel-storage::Storage` read surface into the device/history/similar/
//! recent-incidents lookups this spec names, and follows
//! `sentinel-detection`'s per-key rolling-state pattern for the p95/p99
//! latency histogram exposed by [`service::Enricher`].

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod service;
pub mod stats;

pub use service::{context_keys, Enricher};
