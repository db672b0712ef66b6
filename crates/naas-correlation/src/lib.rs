//! # naas-correlation
//!
//! The Correlator (spec §4.3): deduplicates and time-windows enriched
//! anomalies by `(ship_id, domain)`, publishing `incidents.created` once a
//! partition's evidence count reaches the correlation threshold. Generalizes
//! `sentinel-alerting::AlertDeduplicator`'s alert-storm guard into
//! fingerprint-keyed suppression, and follows
//! `windowing.py`/`deduplication.py` for the windowing and dedup semantics.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod dedup;
pub mod fingerprint;
pub mod service;
pub mod window;

pub use dedup::{DedupConfig, DedupStats, DeduplicationCache};
pub use service::{Correlator, CorrelationOutcome};
pub use window::{FiredWindow, TimeWindowManager, WindowInfo, WindowStats};
