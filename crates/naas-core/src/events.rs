//! Event type definitions flowing across the four bus subjects.
//!
//! Every record shares a schema envelope of `schema_version`, `tracking_id`,
//! and `ts`. `SCHEMA_VERSION` is the only version this pipeline accepts;
//! anything else must be routed to a dead-letter subject rather than
//! silently coerced (spec §3 invariant ii).

use crate::types::{Domain, IncidentStatus, Severity, TrackingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The only schema version this pipeline accepts on inbound records.
pub const SCHEMA_VERSION: &str = "3.0";

/// Free-form ingest record consumed from `logs.raw` / `metrics.raw`.
///
/// Dynamic `metadata` is kept as an opaque JSON value and only ever queried
/// with safe accessors (spec §9) -- never unpacked into typed fields beyond
/// the ones named here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIngestRecord {
    /// Schema version the producer claims to speak.
    #[serde(default)]
    pub schema_version: Option<String>,
    /// Tracking id, if the producer already assigned one.
    #[serde(default)]
    pub tracking_id: Option<String>,
    /// Record timestamp; defaults to now if absent.
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    /// Originating hostname, used for ship-id fallback derivation.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Top-level ship id, if present on the record.
    #[serde(default)]
    pub ship_id: Option<String>,
    /// Top-level device id, if present on the record.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Affected service name.
    #[serde(default)]
    pub service: Option<String>,
    /// Domain this record belongs to.
    #[serde(default)]
    pub domain: Option<Domain>,
    /// Log level, for `logs.raw` records.
    #[serde(default)]
    pub level: Option<String>,
    /// Free-form message text.
    #[serde(default)]
    pub message: Option<String>,
    /// Metric name, for `metrics.raw` records.
    #[serde(default)]
    pub metric_name: Option<String>,
    /// Metric value, for `metrics.raw` records.
    #[serde(default)]
    pub metric_value: Option<f64>,
    /// Opaque nested metadata blob (may carry `ship_id`, `device_id`, etc).
    #[serde(default)]
    pub metadata: Value,
    /// Any fields not otherwise modeled, preserved verbatim as `raw_msg`.
    #[serde(flatten)]
    pub raw: HashMap<String, Value>,
}

impl RawIngestRecord {
    /// Safe accessor: a string field under `metadata`, present, non-empty,
    /// and not literally containing `"unknown"` (spec §4.1, §9).
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        let value = self.metadata.get(key)?.as_str()?;
        if value.is_empty() || value.to_ascii_lowercase().contains("unknown") {
            None
        } else {
            Some(value)
        }
    }
}

/// Produced by the Anomaly Detector on `anomaly.detected`. Created once,
/// never mutated (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyDetected {
    /// Schema envelope.
    pub schema_version: String,
    /// Schema envelope.
    pub tracking_id: TrackingId,
    /// Schema envelope.
    pub ts: DateTime<Utc>,
    /// Resolved ship id; never empty (spec §3 invariant iii).
    pub ship_id: String,
    /// Resolved device id, if known.
    pub device_id: Option<String>,
    /// Affected service name.
    pub service: String,
    /// Domain, for correlation windowing.
    pub domain: Domain,
    /// Detector id that produced this anomaly.
    pub detector: String,
    /// Deterministic score in `[0.0, 1.0]`.
    pub score: f64,
    /// Severity.
    pub severity: Severity,
    /// Free-form anomaly type tag.
    pub anomaly_type: String,
    /// Metric name, if this anomaly came from a metric sample.
    pub metric_name: Option<String>,
    /// Metric value, if this anomaly came from a metric sample.
    pub metric_value: Option<f64>,
    /// Short human-readable description.
    pub msg: String,
    /// Original ingest record, preserved for downstream debugging.
    pub raw_msg: Value,
    /// Debug metadata: resolution source, etc. Never typed fields beyond
    /// what's needed for observability.
    pub meta: HashMap<String, Value>,
}

impl AnomalyDetected {
    /// Build a new `AnomalyDetected`. `ts` is stamped at construction time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracking_id: TrackingId,
        ship_id: impl Into<String>,
        device_id: Option<String>,
        service: impl Into<String>,
        domain: Domain,
        detector: impl Into<String>,
        score: f64,
        severity: Severity,
        anomaly_type: impl Into<String>,
        msg: impl Into<String>,
        raw_msg: Value,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tracking_id,
            ts: Utc::now(),
            ship_id: ship_id.into(),
            device_id,
            service: service.into(),
            domain,
            detector: detector.into(),
            score,
            severity,
            anomaly_type: anomaly_type.into(),
            metric_name: None,
            metric_value: None,
            msg: msg.into(),
            raw_msg,
            meta: HashMap::new(),
        }
    }

    /// Attach metric identity to this anomaly.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metric_name = Some(name.into());
        self.metric_value = Some(value);
        self
    }

    /// Record a debug-only meta field (e.g. `ship_id_source`).
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.meta.insert(key.into(), v);
        }
        self
    }
}

/// Produced by the Enricher on `anomaly.enriched`. Wraps `AnomalyDetected`
/// with historical `context`; never mutated after publish (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEnriched {
    /// The anomaly being enriched.
    #[serde(flatten)]
    pub anomaly: AnomalyDetected,
    /// Context keyed by source name: `device`, `history`, `similar`,
    /// `recent_incidents` (spec §4.2).
    pub context: HashMap<String, Value>,
    /// Free-form tag set.
    pub tags: Vec<String>,
}

impl AnomalyEnriched {
    /// Wrap a detected anomaly with empty context, ready to be filled in by
    /// the enrichment queries.
    pub fn new(anomaly: AnomalyDetected) -> Self {
        Self {
            anomaly,
            context: HashMap::new(),
            tags: Vec::new(),
        }
    }

    /// Set a context slot (spec §4.2's four stable keys).
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// A single piece of evidence contributing to an incident (spec §3, §9 --
/// carries only an opaque `tracking_id` plus a small summary, never a
/// pointer back to the full anomaly record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Tracking id of the contributing anomaly.
    pub tracking_id: TrackingId,
    /// Timestamp of the contributing anomaly.
    pub ts: DateTime<Utc>,
    /// Detector id.
    pub detector: String,
    /// Anomaly score.
    pub score: f64,
    /// Short message.
    pub msg: String,
}

/// Aggregated metadata recorded on an `IncidentCreated` (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentMeta {
    /// Tracking ids of every contributing anomaly.
    pub tracking_ids: Vec<TrackingId>,
    /// Distinct detector ids that contributed.
    pub detectors: Vec<String>,
    /// Window duration in effect when this incident fired.
    pub window_seconds: u64,
}

/// Produced by the Correlator on `incidents.created`. Append-only once
/// published; mutation only happens via the Persistor's upsert (spec §3
/// invariant vi).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentCreated {
    /// Schema envelope.
    pub schema_version: String,
    /// Schema envelope: the first contributing anomaly's tracking id.
    pub tracking_id: TrackingId,
    /// Schema envelope.
    pub ts: DateTime<Utc>,
    /// `INC-{ship_id}-{domain}-{unix_seconds}`.
    pub incident_id: String,
    /// Domain the window fired in.
    pub incident_type: Domain,
    /// Ship id.
    pub ship_id: String,
    /// `max(priority)` over evidence (spec §3 invariant v).
    pub severity: Severity,
    /// Human-readable summary.
    pub summary: String,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Ordered evidence (insertion order preserved).
    pub evidence: Vec<Evidence>,
    /// Aggregated metadata.
    pub meta: IncidentMeta,
}

impl IncidentCreated {
    /// Build an incident from a fired window's anomalies. `evidence` must
    /// already be in arrival order; `severity` is computed as the max
    /// priority over `evidence_severities` using a null-safe fold (spec §9).
    pub fn from_window(
        ship_id: impl Into<String>,
        domain: Domain,
        evidence: Vec<Evidence>,
        evidence_severities: &[Severity],
        window_seconds: u64,
        fired_at: DateTime<Utc>,
    ) -> Self {
        let ship_id = ship_id.into();
        let severity = evidence_severities
            .iter()
            .copied()
            .fold(Severity::Low, |acc, s| if s > acc { s } else { acc });

        let tracking_id = evidence
            .first()
            .map(|e| e.tracking_id.clone())
            .unwrap_or_else(TrackingId::generate);

        let tracking_ids = evidence.iter().map(|e| e.tracking_id.clone()).collect();
        let mut detectors: Vec<String> = evidence.iter().map(|e| e.detector.clone()).collect();
        detectors.sort();
        detectors.dedup();

        let incident_id = format!(
            "INC-{}-{}-{}",
            ship_id,
            domain,
            fired_at.timestamp()
        );

        let summary = format!("{} anomalies detected in {}", evidence.len(), domain);

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tracking_id,
            ts: fired_at,
            incident_id,
            incident_type: domain,
            ship_id,
            severity,
            summary,
            status: IncidentStatus::Open,
            evidence,
            meta: IncidentMeta {
                tracking_ids,
                detectors,
                window_seconds,
            },
        }
    }
}

/// AI-generated root-cause/remediation text (spec §4.4). Both fields are
/// guaranteed non-empty on the published record, falling back to templated
/// text when the LLM is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiInsights {
    /// Root cause analysis.
    pub root_cause: String,
    /// Remediation suggestion text.
    pub remediation: String,
}

/// A similar historical incident surfaced via vector-similarity recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarIncident {
    /// The similar incident's id.
    pub incident_id: String,
    /// Cosine similarity score.
    pub similarity_score: f64,
    /// How it was resolved, if known.
    pub resolution: Option<String>,
}

/// Produced by the Incident Enricher on `incidents.enriched`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEnriched {
    /// The incident being enriched.
    #[serde(flatten)]
    pub incident: IncidentCreated,
    /// AI-generated insights; always non-empty strings.
    pub ai_insights: AiInsights,
    /// Similar incidents recalled via the vector store.
    pub similar_incidents: Vec<SimilarIncident>,
    /// Whether `ai_insights` came from the response cache.
    pub cache_hit: bool,
    /// Wall-clock processing time for this incident's enrichment pipeline.
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_anomaly(severity: Severity, tracking_id: &str) -> AnomalyDetected {
        AnomalyDetected::new(
            TrackingId::from_existing(tracking_id),
            "ship-voyager",
            None,
            "engine-monitor",
            Domain::System,
            "zscore",
            severity.detection_score(),
            severity,
            "connection_refused",
            "connection refused",
            Value::Null,
        )
    }

    #[test]
    fn anomaly_detected_carries_schema_version() {
        let anomaly = sample_anomaly(Severity::High, "req-1");
        assert_eq!(anomaly.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn enriched_preserves_tracking_id() {
        let anomaly = sample_anomaly(Severity::Medium, "req-2");
        let tracking_id = anomaly.tracking_id.clone();
        let enriched = AnomalyEnriched::new(anomaly).with_context("device", Value::Null);
        assert_eq!(enriched.anomaly.tracking_id, tracking_id);
        assert!(enriched.context.contains_key("device"));
    }

    #[test]
    fn incident_severity_is_max_of_evidence() {
        let now = Utc::now();
        let evidence = vec![
            Evidence {
                tracking_id: TrackingId::from_existing("req-1"),
                ts: now,
                detector: "zscore".to_string(),
                score: 0.7,
                msg: "m1".to_string(),
            },
            Evidence {
                tracking_id: TrackingId::from_existing("req-2"),
                ts: now,
                detector: "zscore".to_string(),
                score: 0.85,
                msg: "m2".to_string(),
            },
            Evidence {
                tracking_id: TrackingId::from_existing("req-3"),
                ts: now,
                detector: "ewma".to_string(),
                score: 0.7,
                msg: "m3".to_string(),
            },
        ];
        let severities = [Severity::Medium, Severity::High, Severity::Medium];

        let incident = IncidentCreated::from_window(
            "ship-voyager",
            Domain::System,
            evidence,
            &severities,
            600,
            now,
        );

        assert_eq!(incident.severity, Severity::High);
        assert_eq!(incident.tracking_id.as_str(), "req-1");
        assert_eq!(incident.meta.tracking_ids.len(), 3);
        assert!(incident.incident_id.starts_with("INC-ship-voyager-system-"));
    }

    #[test]
    fn incident_id_never_has_zero_evidence_in_practice() {
        let now = Utc::now();
        let incident =
            IncidentCreated::from_window("ship-x", Domain::Net, Vec::new(), &[], 300, now);
        assert!(incident.evidence.is_empty());
        // Callers must never publish a zero-evidence incident (spec §8 inv. v);
        // this path only exists so `from_window` itself cannot panic.
    }
}
