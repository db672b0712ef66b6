//! # naas-core
//!
//! Core types, error handling, configuration, and tracing shared across the
//! maritime AIOps streaming pipeline:
//! - Schema envelope and bus event models
//! - Domain/Severity/TrackingId and other shared value types
//! - A single pipeline-wide error hierarchy
//! - Environment-sourced configuration
//! - Structured logging and tracking-id propagation

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod types;

pub use error::{Error, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::events::{
        AiInsights, AnomalyDetected, AnomalyEnriched, Evidence, IncidentCreated, IncidentEnriched,
        IncidentMeta, RawIngestRecord, SimilarIncident, SCHEMA_VERSION,
    };
    pub use crate::logging::{tracked_operation, LogFormat};
    pub use crate::types::{Domain, IncidentStatus, Severity, ShipIdSource, TrackingId};
}
