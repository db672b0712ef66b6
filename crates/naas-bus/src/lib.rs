//! # naas-bus
//!
//! Message bus client over the four JSON subjects threaded through the
//! pipeline (spec §6): `logs.raw`/`metrics.raw` in, `anomaly.detected`,
//! `anomaly.enriched`, `incidents.created`, `incidents.enriched` in/out, and
//! `deadletter.{subject}` out. Generalizes `sentinel-alerting`'s
//! single-purpose RabbitMQ alert publisher into a symmetric publish/subscribe
//! client.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod rabbitmq;

pub use rabbitmq::{RabbitMqBusClient, RabbitMqConfig};

use async_trait::async_trait;
use naas_core::Result;
use serde::Serialize;

/// Well-known subject names (spec §6).
pub mod subjects {
    /// Raw log ingest records.
    pub const LOGS_RAW: &str = "logs.raw";
    /// Raw metric ingest records.
    pub const METRICS_RAW: &str = "metrics.raw";
    /// Detector output.
    pub const ANOMALY_DETECTED: &str = "anomaly.detected";
    /// Enricher output.
    pub const ANOMALY_ENRICHED: &str = "anomaly.enriched";
    /// Correlator output.
    pub const INCIDENTS_CREATED: &str = "incidents.created";
    /// Incident Enricher output.
    pub const INCIDENTS_ENRICHED: &str = "incidents.enriched";

    /// Build the dead-letter subject for a given origin subject.
    pub fn deadletter_for(subject: &str) -> String {
        format!("deadletter.{subject}")
    }
}

/// Envelope published to a `deadletter.{subject}` subject (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter<'a> {
    /// Why the record was dead-lettered.
    pub reason: &'a str,
    /// The original payload, preserved verbatim.
    pub original: serde_json::Value,
}

/// Publish-only surface, dyn-safe so services can depend on `Arc<dyn
/// BusPublisher>` in tests (mirrors `sentinel-alerting`'s `Alerter` trait
/// shape).
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish a raw JSON payload to a subject.
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()>;

    /// Publish a serializable value to a subject.
    async fn publish_json<T>(&self, subject: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
        Self: Sized,
    {
        let payload = serde_json::to_vec(value).map_err(naas_core::Error::Serialization)?;
        self.publish(subject, &payload).await
    }

    /// Publish a dead-letter record for `subject`.
    async fn publish_deadletter(&self, subject: &str, reason: &str, original: serde_json::Value) -> Result<()>;

    /// Health check against the underlying transport.
    async fn health_check(&self) -> Result<()>;

    /// Client name for logging.
    fn name(&self) -> &str;
}
