//! The Incident Persistor (spec §4.5): idempotently upserts an enriched
//! incident into the columnar store and appends a timeline entry for every
//! status transition. Re-applies spec §4.1's ship-id fallback chain terminal
//! step if an incident somehow reaches persistence with an invalid
//! `ship_id` -- a last-resort guard for spec §8 invariant vi ("ship_id is
//! never empty"), grounded in `sentinel-storage`'s upsert-by-primary-key
//! pattern.

use naas_core::events::IncidentEnriched;
use naas_core::Result;
use naas_registry::hostname_fallback;
use naas_storage::queries::TimelineEntry;
use naas_storage::ColumnarStore;
use std::sync::Arc;
use tracing::{info, warn};

fn ship_id_is_valid(ship_id: &str) -> bool {
    !ship_id.is_empty() && !ship_id.to_ascii_lowercase().starts_with("unknown")
}

/// Upserts incidents and maintains their append-only timeline.
#[derive(Debug)]
pub struct IncidentPersistor {
    store: Arc<dyn ColumnarStore>,
}

impl IncidentPersistor {
    pub fn new(store: Arc<dyn ColumnarStore>) -> Self {
        Self { store }
    }

    /// Persist one enriched incident. Idempotent on `incident_id`: calling
    /// this twice for the same incident yields a single row plus one
    /// timeline entry per call (spec §4.5, §8 invariant vi).
    pub async fn persist(&self, mut incident: IncidentEnriched, note: &str) -> Result<()> {
        if !ship_id_is_valid(&incident.incident.ship_id) {
            let fallback = hostname_fallback(None);
            warn!(
                incident_id = %incident.incident.incident_id,
                prior_ship_id = %incident.incident.ship_id,
                fallback_ship_id = %fallback.ship_id,
                "incident reached persistence with invalid ship_id, applying terminal fallback"
            );
            incident.incident.ship_id = fallback.ship_id;
            metrics::counter!(naas_core::metrics::counters::REGISTRY_FALLBACKS_TOTAL).increment(1);
        }

        let timeline = vec![TimelineEntry {
            status: incident.incident.status.to_string(),
            at: chrono::Utc::now(),
            note: note.to_string(),
        }];

        self.store.upsert_incident(&incident, &timeline).await?;
        info!(
            incident_id = %incident.incident.incident_id,
            ship_id = %incident.incident.ship_id,
            note,
            "incident persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use naas_core::events::{AiInsights, Evidence, IncidentCreated, IncidentMeta};
    use naas_core::types::{Domain, IncidentStatus, Severity, TrackingId};
    use naas_storage::queries::{
        CachedResponse, DeviceMetadata, FailureRate, LlmCacheStats, RecentIncidentRecord,
        SimilarAnomaliesQuery, SimilarAnomalyRecord,
    };
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingStore {
        upserts: Mutex<Vec<(String, String, usize)>>,
    }

    #[async_trait]
    impl ColumnarStore for RecordingStore {
        async fn device_metadata(&self, _: &str, _: &str) -> Result<Option<DeviceMetadata>> {
            Ok(None)
        }
        async fn failure_rate_24h(&self, _: &str, _: Domain) -> Result<FailureRate> {
            Ok(FailureRate::empty())
        }
        async fn similar_anomalies_7d(&self, _: SimilarAnomaliesQuery) -> Result<Vec<SimilarAnomalyRecord>> {
            Ok(Vec::new())
        }
        async fn recent_incidents_24h(&self, _: &str, _: Domain, _: usize) -> Result<Vec<RecentIncidentRecord>> {
            Ok(Vec::new())
        }
        async fn upsert_incident(&self, incident: &IncidentEnriched, timeline: &[TimelineEntry]) -> Result<()> {
            self.upserts.lock().unwrap().push((
                incident.incident.incident_id.clone(),
                incident.incident.ship_id.clone(),
                timeline.len(),
            ));
            Ok(())
        }
        async fn get_cached_llm_response(&self, _: &str) -> Result<Option<CachedResponse>> {
            Ok(None)
        }
        async fn store_llm_response(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: serde_json::Value,
            _: u64,
        ) -> Result<()> {
            Ok(())
        }
        async fn llm_cache_stats(&self) -> Result<LlmCacheStats> {
            Ok(LlmCacheStats::default())
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn sample_incident(ship_id: &str) -> IncidentEnriched {
        IncidentEnriched {
            incident: IncidentCreated {
                schema_version: naas_core::events::SCHEMA_VERSION.to_string(),
                tracking_id: TrackingId::from_existing("req-1"),
                ts: chrono::Utc::now(),
                incident_id: "INC-ship-voyager-net-1700000000".to_string(),
                incident_type: Domain::Net,
                ship_id: ship_id.to_string(),
                severity: Severity::High,
                summary: "summary".to_string(),
                status: IncidentStatus::Open,
                evidence: vec![Evidence {
                    tracking_id: TrackingId::from_existing("req-1"),
                    ts: chrono::Utc::now(),
                    detector: "zscore".to_string(),
                    score: 0.8,
                    msg: "deviation".to_string(),
                }],
                meta: IncidentMeta {
                    tracking_ids: vec![TrackingId::from_existing("req-1")],
                    detectors: vec!["zscore".to_string()],
                    window_seconds: 300,
                },
            },
            ai_insights: AiInsights {
                root_cause: "rc".to_string(),
                remediation: "rem".to_string(),
            },
            similar_incidents: Vec::new(),
            cache_hit: false,
            processing_time_ms: 10,
        }
    }

    #[tokio::test]
    async fn valid_ship_id_passes_through_unchanged() {
        let store = Arc::new(RecordingStore::default());
        let persistor = IncidentPersistor::new(store.clone());

        persistor.persist(sample_incident("ship-voyager"), "created").await.unwrap();

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts[0].1, "ship-voyager");
    }

    #[tokio::test]
    async fn empty_ship_id_gets_terminal_fallback() {
        let store = Arc::new(RecordingStore::default());
        let persistor = IncidentPersistor::new(store.clone());

        persistor.persist(sample_incident(""), "created").await.unwrap();

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts[0].1, "unknown-ship");
    }

    #[tokio::test]
    async fn unknown_prefixed_ship_id_gets_terminal_fallback() {
        let store = Arc::new(RecordingStore::default());
        let persistor = IncidentPersistor::new(store.clone());

        persistor.persist(sample_incident("UNKNOWN-host"), "created").await.unwrap();

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts[0].1, "unknown-ship");
    }

    #[tokio::test]
    async fn repeated_persist_is_idempotent_per_call_with_one_timeline_entry() {
        let store = Arc::new(RecordingStore::default());
        let persistor = IncidentPersistor::new(store.clone());

        persistor.persist(sample_incident("ship-voyager"), "created").await.unwrap();
        persistor.persist(sample_incident("ship-voyager"), "ai insights attached").await.unwrap();

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 2);
        assert_eq!(upserts[0].0, upserts[1].0);
        assert_eq!(upserts[1].2, 1);
    }
}
