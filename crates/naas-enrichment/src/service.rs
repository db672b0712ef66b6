//! The Enricher service (spec §4.2): runs the four read-only columnar-store
//! lookups concurrently per anomaly, joins them at a single barrier, and
//! never lets a slow or failed query abort enrichment.

use crate::stats::LatencyHistogram;
use naas_core::events::{AnomalyDetected, AnomalyEnriched};
use naas_core::types::Severity;
use naas_storage::queries::SimilarAnomaliesQuery;
use naas_storage::ColumnarStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Per-query timeout applied to each of the four enrichment lookups (spec
/// §4.2: "each executed with a per-query timeout").
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(400);

/// Stable context keys the four enrichment queries populate (spec §4.2).
pub mod context_keys {
    /// Device metadata lookup result.
    pub const DEVICE: &str = "device";
    /// 24h failure-rate aggregate.
    pub const HISTORY: &str = "history";
    /// 7-day similar-anomalies lookup.
    pub const SIMILAR: &str = "similar";
    /// 24h recent-incidents lookup.
    pub const RECENT_INCIDENTS: &str = "recent_incidents";
}

/// Joins `AnomalyDetected` with historical context from the columnar store.
#[derive(Debug)]
pub struct Enricher {
    store: Arc<dyn ColumnarStore>,
    query_timeout: Duration,
    latency: LatencyHistogram,
}

impl Enricher {
    /// Build an enricher against a shared columnar-store client, using the
    /// spec default 400ms per-query timeout (comfortably inside the 500ms
    /// p99 barrier target once the four queries run concurrently).
    pub fn new(store: Arc<dyn ColumnarStore>) -> Self {
        Self {
            store,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            latency: LatencyHistogram::default(),
        }
    }

    /// Override the per-query timeout (tests use a short one to exercise
    /// the timeout path deterministically).
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// p95 of recorded enrichment-barrier latencies, in milliseconds.
    pub fn p95_ms(&self) -> f64 {
        self.latency.p95()
    }

    /// p99 of recorded enrichment-barrier latencies, in milliseconds.
    pub fn p99_ms(&self) -> f64 {
        self.latency.p99()
    }

    /// Enrich one anomaly. Never returns `Err` for a dependency failure --
    /// every one of the four queries degrades to `{"error": reason}` in its
    /// own context slot (spec §4.2, §7: "degrading gracefully").
    pub async fn enrich(&self, anomaly: AnomalyDetected) -> AnomalyEnriched {
        let started = Instant::now();

        let device_id = anomaly.device_id.clone().unwrap_or_default();
        let (device, history, similar, recent_incidents) = tokio::join!(
            self.run(self.store.device_metadata(&anomaly.ship_id, &device_id)),
            self.run(self.store.failure_rate_24h(&anomaly.ship_id, anomaly.domain)),
            self.run(self.store.similar_anomalies_7d(SimilarAnomaliesQuery {
                ship_id: anomaly.ship_id.clone(),
                domain: anomaly.domain,
                anomaly_type: anomaly.anomaly_type.clone(),
                metric_name: anomaly.metric_name.clone(),
                service: Some(anomaly.service.clone()),
                limit: 10,
            })),
            self.run(
                self.store
                    .recent_incidents_24h(&anomaly.ship_id, anomaly.domain, 5)
            ),
        );

        let tags = derive_tags(&anomaly);

        let enriched = AnomalyEnriched::new(anomaly)
            .with_context(context_keys::DEVICE, device)
            .with_context(context_keys::HISTORY, history)
            .with_context(context_keys::SIMILAR, similar)
            .with_context(context_keys::RECENT_INCIDENTS, recent_incidents);

        let enriched = AnomalyEnriched { tags, ..enriched };

        let elapsed = started.elapsed();
        self.latency.record(elapsed);
        metrics::histogram!(naas_core::metrics::histograms::ENRICHMENT_DURATION_SECONDS)
            .record(elapsed.as_secs_f64());

        enriched
    }

    /// Run one query under the per-query timeout, collapsing any timeout or
    /// query error into `{"error": reason}` rather than propagating it.
    async fn run<T, F>(&self, fut: F) -> Value
    where
        F: std::future::Future<Output = naas_core::Result<T>>,
        T: serde::Serialize,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(Ok(value)) => serde_json::to_value(value).unwrap_or(Value::Null),
            Ok(Err(e)) => {
                warn!(error = %e, "enrichment query failed, attaching error context");
                metrics::counter!(naas_core::metrics::counters::ERRORS_TOTAL).increment(1);
                json!({ "error": e.to_string() })
            }
            Err(_) => {
                warn!(timeout_ms = self.query_timeout.as_millis(), "enrichment query timed out");
                metrics::counter!(naas_core::metrics::counters::TIMEOUTS_TOTAL).increment(1);
                json!({ "error": "timeout" })
            }
        }
    }
}

/// Derive a small free-form tag set from the anomaly itself (severity and
/// domain bands), useful for downstream filtering without re-parsing
/// `context`.
fn derive_tags(anomaly: &AnomalyDetected) -> Vec<String> {
    let mut tags = vec![format!("domain:{}", anomaly.domain), anomaly.anomaly_type.clone()];
    if anomaly.severity >= Severity::High {
        tags.push("urgent".to_string());
    }
    tags
}
