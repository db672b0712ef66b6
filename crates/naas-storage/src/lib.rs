//! # naas-storage
//!
//! Columnar store client backing the Enricher's four read-only lookups
//! (spec §4.2), the Incident Persistor's upsert (spec §4.5), and the LLM
//! response cache table (spec §4.4.1). Generalizes
//! `sentinel-storage::Storage` trait from a telemetry/anomaly time-series
//! store into the tables spec §6 names: `devices`, `anomalies`,
//! `incidents`, `llm_cache`.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod cache_key;
pub mod influxdb;
pub mod queries;

use async_trait::async_trait;
use naas_core::events::IncidentEnriched;
use naas_core::types::Domain;
use naas_core::Result;
use queries::{
    CachedResponse, DeviceMetadata, FailureRate, LlmCacheStats, RecentIncidentRecord,
    SimilarAnomaliesQuery, SimilarAnomalyRecord, TimelineEntry,
};

/// Read/write surface the Enricher, Correlator, Incident Enricher, and
/// Incident Persistor depend on. `dyn`-safe so services hold
/// `Arc<dyn ColumnarStore>` and tests substitute an in-memory fake.
#[async_trait]
pub trait ColumnarStore: Send + Sync {
    /// `devices` lookup by `(ship_id, device_id)` (spec §4.2.1). `Ok(None)`
    /// on a miss; enrichment never aborts on this.
    async fn device_metadata(
        &self,
        ship_id: &str,
        device_id: &str,
    ) -> Result<Option<DeviceMetadata>>;

    /// 24h failure-rate aggregate keyed by `(ship_id, domain)` (spec
    /// §4.2.2). Returns a zeroed [`FailureRate`] rather than erroring.
    async fn failure_rate_24h(&self, ship_id: &str, domain: Domain) -> Result<FailureRate>;

    /// Up to 10 similar anomalies over the last 7 days (spec §4.2.3).
    async fn similar_anomalies_7d(
        &self,
        query: SimilarAnomaliesQuery,
    ) -> Result<Vec<SimilarAnomalyRecord>>;

    /// Up to `limit` recent incidents of the same domain over the last 24h
    /// (spec §4.2.4).
    async fn recent_incidents_24h(
        &self,
        ship_id: &str,
        domain: Domain,
        limit: usize,
    ) -> Result<Vec<RecentIncidentRecord>>;

    /// Upsert an enriched incident into `incidents`, keyed by `incident_id`
    /// (spec §4.5). Idempotent: publishing the same incident twice yields a
    /// single row.
    async fn upsert_incident(
        &self,
        incident: &IncidentEnriched,
        timeline: &[TimelineEntry],
    ) -> Result<()>;

    /// Look up a cached LLM response by its pre-computed cache key (spec
    /// §4.4.1). `Ok(None)` on a miss or expiry.
    async fn get_cached_llm_response(&self, cache_key: &str) -> Result<Option<CachedResponse>>;

    /// Write a freshly generated LLM response to `llm_cache` with a
    /// `ttl_hours`-hour expiry (spec §4.4.1, default 24h).
    #[allow(clippy::too_many_arguments)]
    async fn store_llm_response(
        &self,
        cache_key: &str,
        incident_type: &str,
        response_type: &str,
        response_text: &str,
        metadata: serde_json::Value,
        ttl_hours: u64,
    ) -> Result<()>;

    /// Per-`response_type` cache accounting (SPEC_FULL.md §2).
    async fn llm_cache_stats(&self) -> Result<LlmCacheStats>;

    /// Reachability check.
    async fn health_check(&self) -> Result<()>;
}

/// Re-exported commonly used types.
pub mod prelude {
    pub use crate::cache_key::cache_key;
    pub use crate::influxdb::{InfluxConfig, InfluxColumnarStore};
    pub use crate::queries::*;
    pub use crate::ColumnarStore;
}
