//! The Incident Enricher (spec §4.4): generates AI root-cause and
//! remediation text for a fired incident, recalls similar historical
//! incidents via vector search, and stores the result -- all within a hard
//! 10s wall-clock budget, falling back to templated text and an empty
//! similar-incidents list if the budget is exhausted (spec §4.4, §7).
//!
//! Cache keys are built from `(incident_type, severity, detector, None)`
//! rather than `(incident_type, severity, service, metric_name)` as
//! `llm_cache.py` does -- `IncidentCreated`'s evidence carries a detector id,
//! not a service or metric name (DESIGN.md); the first contributing
//! detector stands in for "service" as the best available proxy for
//! catching similar incidents.

use crate::ollama::{IncidentPromptContext, OllamaClient};
use crate::vector_store::{IncidentEmbeddingInput, VectorStoreClient};
use naas_core::events::{AiInsights, IncidentCreated, IncidentEnriched, SimilarIncident};
use naas_storage::cache_key::cache_key;
use naas_storage::queries::CachedResponse;
use naas_storage::ColumnarStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const ROOT_CAUSE: &str = "root_cause";
const REMEDIATION: &str = "remediation";

/// Templated fallback text used when the LLM is unavailable or the budget
/// runs out (spec §4.4: "both fields are guaranteed non-empty").
fn fallback_root_cause(incident: &IncidentCreated) -> String {
    format!(
        "Root cause analysis unavailable. {} severity {} incident with {} contributing anomal{}.",
        incident.severity,
        incident.incident_type,
        incident.evidence.len(),
        if incident.evidence.len() == 1 { "y" } else { "ies" }
    )
}

fn fallback_remediation(incident: &IncidentCreated) -> String {
    format!(
        "Remediation suggestions unavailable. Review the {} domain's affected services and escalate per standard {} severity procedure.",
        incident.incident_type, incident.severity
    )
}

/// Runtime accounting for the Incident Enricher (SPEC_FULL.md §2).
#[derive(Debug, Default)]
pub struct IncidentEnricherStats {
    pub incidents_processed: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub llm_calls: AtomicU64,
    pub timeouts: AtomicU64,
    pub errors: AtomicU64,
}

/// Snapshot of [`IncidentEnricherStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IncidentEnricherStatsSnapshot {
    pub incidents_processed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub llm_calls: u64,
    pub timeouts: u64,
    pub errors: u64,
}

/// Ties the LLM client, vector store, and response cache together under a
/// single wall-clock budget per incident.
#[derive(Debug)]
pub struct IncidentEnricher {
    store: Arc<dyn ColumnarStore>,
    llm: OllamaClient,
    vector_store: VectorStoreClient,
    budget: Duration,
    cache_ttl_hours: u64,
    stats: IncidentEnricherStats,
}

impl IncidentEnricher {
    pub fn new(
        store: Arc<dyn ColumnarStore>,
        llm: OllamaClient,
        vector_store: VectorStoreClient,
        budget_secs: u64,
        cache_ttl_hours: u64,
    ) -> Self {
        Self {
            store,
            llm,
            vector_store,
            budget: Duration::from_secs(budget_secs),
            cache_ttl_hours,
            stats: IncidentEnricherStats::default(),
        }
    }

    pub fn stats(&self) -> IncidentEnricherStatsSnapshot {
        IncidentEnricherStatsSnapshot {
            incidents_processed: self.stats.incidents_processed.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            llm_calls: self.stats.llm_calls.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }

    /// Enrich a fired incident. Never returns `Err`: every failure mode
    /// (cache miss, LLM timeout, LLM error, vector store outage) degrades to
    /// a fallback value rather than aborting (spec §4.4, §7).
    pub async fn enrich(&self, incident: IncidentCreated) -> IncidentEnriched {
        let started = Instant::now();
        self.stats.incidents_processed.fetch_add(1, Ordering::Relaxed);

        let remaining = || self.budget.saturating_sub(started.elapsed());

        let detector = incident.meta.detectors.first().cloned().unwrap_or_default();
        let incident_type_str = incident.incident_type.to_string();
        let severity_str = incident.severity.to_string();

        let root_cause_key = cache_key(ROOT_CAUSE, &incident_type_str, &severity_str, &detector, None);
        let remediation_key = cache_key(REMEDIATION, &incident_type_str, &severity_str, &detector, None);

        let (root_cause, from_cache_rc) = self
            .resolve_response(&root_cause_key, &incident_type_str, remaining(), || {
                self.generate_root_cause(&incident, &detector)
            })
            .await
            .unwrap_or_else(|| (fallback_root_cause(&incident), false));

        let (remediation, from_cache_rem) = self
            .resolve_response(&remediation_key, &incident_type_str, remaining(), || {
                self.generate_remediation(&incident, &detector, Some(&root_cause))
            })
            .await
            .unwrap_or_else(|| (fallback_remediation(&incident), false));

        let cache_hit = from_cache_rc && from_cache_rem;

        let similar_incidents = if remaining() > Duration::ZERO {
            let embedding_input = IncidentEmbeddingInput {
                incident_id: incident.incident_id.clone(),
                incident_type: incident.incident_type,
                severity: severity_str.clone(),
                service: detector.clone(),
                metric_name: None,
                ship_id: incident.ship_id.clone(),
                resolution: None,
            };
            self.vector_store
                .search_similar(&embedding_input)
                .await
                .into_iter()
                .map(|hit| SimilarIncident {
                    incident_id: hit.incident_id,
                    similarity_score: hit.similarity_score,
                    resolution: hit.resolution,
                })
                .collect()
        } else {
            warn!(incident_id = %incident.incident_id, "budget exhausted before similarity search, skipping");
            Vec::new()
        };

        let processing_time_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!(naas_core::metrics::histograms::INCIDENT_ENRICHMENT_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(naas_core::metrics::counters::INCIDENTS_PROCESSED_TOTAL).increment(1);

        let embedding_input = IncidentEmbeddingInput {
            incident_id: incident.incident_id.clone(),
            incident_type: incident.incident_type,
            severity: severity_str,
            service: detector,
            metric_name: None,
            ship_id: incident.ship_id.clone(),
            resolution: None,
        };
        self.vector_store.store_incident(&embedding_input, &incident.ts.to_rfc3339()).await;

        IncidentEnriched {
            incident,
            ai_insights: AiInsights { root_cause, remediation },
            similar_incidents,
            cache_hit,
            processing_time_ms,
        }
    }

    /// Consult the response cache; on miss, generate under whatever budget
    /// remains and write the result back. Returns `None` only if the budget
    /// is already exhausted, letting the caller fall back.
    async fn resolve_response<'a, F, Fut>(
        &'a self,
        key: &str,
        incident_type: &str,
        remaining: Duration,
        generate: F,
    ) -> Option<(String, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = naas_core::Result<String>> + 'a,
    {
        if remaining.is_zero() {
            self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self.store.get_cached_llm_response(key).await {
            Ok(Some(CachedResponse { response_text, .. })) => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(naas_core::metrics::counters::CACHE_HITS_TOTAL).increment(1);
                return Some((response_text, true));
            }
            Ok(None) => {
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(naas_core::metrics::counters::CACHE_MISSES_TOTAL).increment(1);
            }
            Err(e) => {
                warn!(error = %e, key, "llm cache lookup failed, treating as miss");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.stats.llm_calls.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(naas_core::metrics::counters::LLM_CALLS_TOTAL).increment(1);

        let generated = match tokio::time::timeout(remaining, generate()).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, key, "llm generation failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(_) => {
                warn!(key, "llm generation exceeded remaining budget");
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(naas_core::metrics::counters::TIMEOUTS_TOTAL).increment(1);
                return None;
            }
        };

        if let Err(e) = self
            .store
            .store_llm_response(
                key,
                incident_type,
                if key.starts_with(ROOT_CAUSE) { ROOT_CAUSE } else { REMEDIATION },
                &generated,
                serde_json::json!({}),
                self.cache_ttl_hours,
            )
            .await
        {
            warn!(error = %e, key, "failed to write llm response to cache");
        }

        Some((generated, false))
    }

    async fn generate_root_cause(&self, incident: &IncidentCreated, detector: &str) -> naas_core::Result<String> {
        let ctx = prompt_context(incident, detector);
        info!(incident_id = %incident.incident_id, "generating root cause analysis");
        self.llm.generate_root_cause_analysis(&ctx).await
    }

    async fn generate_remediation(
        &self,
        incident: &IncidentCreated,
        detector: &str,
        root_cause: Option<&str>,
    ) -> naas_core::Result<String> {
        let ctx = prompt_context(incident, detector);
        info!(incident_id = %incident.incident_id, "generating remediation suggestions");
        self.llm.generate_remediation_suggestions(&ctx, root_cause).await
    }
}

fn prompt_context(incident: &IncidentCreated, detector: &str) -> IncidentPromptContext {
    IncidentPromptContext {
        incident_type: incident.incident_type.to_string(),
        severity: incident.severity.to_string(),
        service: detector.to_string(),
        metric_name: None,
        metric_value: None,
        scope: incident
            .evidence
            .iter()
            .map(|e| (None, e.detector.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use naas_core::events::Evidence;
    use naas_core::types::{Domain, IncidentStatus, Severity, TrackingId};
    use naas_core::Result;
    use naas_storage::queries::{
        DeviceMetadata, FailureRate, LlmCacheStats, RecentIncidentRecord, SimilarAnomalyRecord,
        SimilarAnomaliesQuery, TimelineEntry,
    };
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Default)]
    struct FakeStore {
        cached: Mutex<Option<CachedResponse>>,
    }

    #[async_trait]
    impl ColumnarStore for FakeStore {
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
        async fn upsert_incident(&self, _: &IncidentEnriched, _: &[TimelineEntry]) -> Result<()> {
            Ok(())
        }
        async fn get_cached_llm_response(&self, _: &str) -> Result<Option<CachedResponse>> {
            Ok(self.cached.lock().unwrap().clone())
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

    fn sample_incident() -> IncidentCreated {
        IncidentCreated {
            schema_version: naas_core::events::SCHEMA_VERSION.to_string(),
            tracking_id: TrackingId::from_existing("req-1"),
            ts: chrono::Utc::now(),
            incident_id: "INC-ship-voyager-net-1700000000".to_string(),
            incident_type: Domain::Net,
            ship_id: "ship-voyager".to_string(),
            severity: Severity::High,
            summary: "3 anomalies detected in net".to_string(),
            status: IncidentStatus::Open,
            evidence: vec![Evidence {
                tracking_id: TrackingId::from_existing("req-1"),
                ts: chrono::Utc::now(),
                detector: "zscore".to_string(),
                score: 0.8,
                msg: "deviation".to_string(),
            }],
            meta: naas_core::events::IncidentMeta {
                tracking_ids: vec![TrackingId::from_existing("req-1")],
                detectors: vec!["zscore".to_string()],
                window_seconds: 300,
            },
        }
    }

    async fn mock_llm_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "generated text"
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn cache_hit_skips_llm_call() {
        let server = mock_llm_server().await;
        let store = Arc::new(FakeStore {
            cached: Mutex::new(Some(CachedResponse {
                response_text: "cached analysis".to_string(),
                metadata: serde_json::json!({}),
                created_at: chrono::Utc::now(),
            })),
        });
        let llm = OllamaClient::new(crate::ollama::OllamaConfig {
            url: server.uri(),
            model: "phi3:mini".to_string(),
            call_timeout_secs: 5,
        })
        .unwrap();
        let vector_store = VectorStoreClient::new(crate::vector_store::VectorStoreConfig {
            url: server.uri(),
            ..Default::default()
        })
        .unwrap();

        let enricher = IncidentEnricher::new(store, llm, vector_store, 10, 24);
        let enriched = enricher.enrich(sample_incident()).await;

        assert_eq!(enriched.ai_insights.root_cause, "cached analysis");
        assert!(enriched.cache_hit);
        assert_eq!(enricher.stats().cache_hits, 2);
    }

    #[tokio::test]
    async fn cache_miss_calls_llm_and_fills_insights() {
        let server = mock_llm_server().await;
        let store = Arc::new(FakeStore::default());
        let llm = OllamaClient::new(crate::ollama::OllamaConfig {
            url: server.uri(),
            model: "phi3:mini".to_string(),
            call_timeout_secs: 5,
        })
        .unwrap();
        let vector_store = VectorStoreClient::new(crate::vector_store::VectorStoreConfig {
            url: server.uri(),
            ..Default::default()
        })
        .unwrap();

        let enricher = IncidentEnricher::new(store, llm, vector_store, 10, 24);
        let enriched = enricher.enrich(sample_incident()).await;

        assert_eq!(enriched.ai_insights.root_cause, "generated text");
        assert!(!enriched.ai_insights.remediation.is_empty());
        assert!(!enriched.cache_hit);
        assert_eq!(enricher.stats().llm_calls, 2);
    }

    #[tokio::test]
    async fn exhausted_budget_falls_back_to_templated_text() {
        let store = Arc::new(FakeStore::default());
        let llm = OllamaClient::new(crate::ollama::OllamaConfig {
            url: "http://localhost:1".to_string(),
            model: "phi3:mini".to_string(),
            call_timeout_secs: 5,
        })
        .unwrap();
        let vector_store = VectorStoreClient::new(crate::vector_store::VectorStoreConfig {
            url: "http://localhost:1".to_string(),
            ..Default::default()
        })
        .unwrap();

        // Zero budget: every resolve_response call sees remaining == 0.
        let enricher = IncidentEnricher::new(store, llm, vector_store, 0, 24);
        let enriched = enricher.enrich(sample_incident()).await;

        assert!(enriched.ai_insights.root_cause.starts_with("Root cause analysis unavailable"));
        assert!(enriched.ai_insights.remediation.starts_with("Remediation suggestions unavailable"));
        assert!(enriched.similar_incidents.is_empty());
    }
}
