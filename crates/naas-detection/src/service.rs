//! The Anomaly Detector service (spec §4.1): ties identity resolution,
//! log-level scoring, and the pluggable metric detectors into a single
//! `process()` entry point the bus-facing wiring calls per inbound record.
//! Per-metric-series windows are kept in a `DashMap`, generalized from
//! `sentinel-detection::baseline::BaselineManager`.

use crate::detectors::DetectionConfig;
use crate::log_scoring;
use crate::stats::RollingWindow;
use dashmap::DashMap;
use naas_core::events::{AnomalyDetected, RawIngestRecord, SCHEMA_VERSION};
use naas_core::metrics::counters;
use naas_core::types::{Domain, ShipIdSource, TrackingId};
use naas_core::{Error, Result};
use naas_registry::RegistryClient;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MetricKey {
    ship_id: String,
    device_id: Option<String>,
    metric_name: String,
}

/// A top-level or metadata string field, valid only when non-empty and not
/// literally containing `"unknown"` (spec §4.1, mirrors
/// [`RawIngestRecord::metadata_str`]'s rule for the record's own fields).
fn valid_field(value: Option<&str>) -> Option<&str> {
    let value = value?;
    if value.is_empty() || value.to_ascii_lowercase().contains("unknown") {
        None
    } else {
        Some(value)
    }
}

/// The Anomaly Detector: consumes `logs.raw`/`metrics.raw`, emits
/// `AnomalyDetected` (spec §4.1).
#[derive(Debug)]
pub struct AnomalyDetector {
    registry: Arc<RegistryClient>,
    config: DetectionConfig,
    windows: DashMap<MetricKey, RollingWindow>,
}

impl AnomalyDetector {
    /// Build a detector against a shared registry client and detection
    /// configuration table.
    pub fn new(registry: Arc<RegistryClient>, config: DetectionConfig) -> Self {
        Self {
            registry,
            config,
            windows: DashMap::new(),
        }
    }

    /// Score one ingest record. Returns `Ok(None)` when the record is
    /// filtered (routine log noise, or neither a log nor a metric record).
    /// Returns `Err` on a schema-version mismatch so the caller routes the
    /// record to its dead-letter subject (spec §3 invariant ii).
    pub async fn process(&self, record: RawIngestRecord) -> Result<Option<AnomalyDetected>> {
        if let Some(version) = &record.schema_version {
            if version != SCHEMA_VERSION {
                return Err(Error::schema(format!(
                    "unsupported schema_version {version}, expected {SCHEMA_VERSION}"
                )));
            }
        }

        let tracking_id = record
            .tracking_id
            .clone()
            .map(TrackingId::from_existing)
            .unwrap_or_else(TrackingId::generate);

        let (ship_id, device_id, source) = self.resolve_identity(&record).await;
        let domain = record.domain.unwrap_or(Domain::System);
        let service = record
            .service
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let raw_msg = serde_json::to_value(&record).unwrap_or(Value::Null);

        if let Some(level) = record.level.clone() {
            let message = record.message.clone().unwrap_or_default();
            let Some(severity) = log_scoring::classify(&level, &message) else {
                debug!(level, "log record filtered, no anomaly emitted");
                return Ok(None);
            };

            let anomaly = AnomalyDetected::new(
                tracking_id,
                ship_id,
                device_id,
                service,
                domain,
                "log_level",
                severity.detection_score(),
                severity,
                "log_event",
                message,
                raw_msg,
            )
            .with_meta("ship_id_source", source.to_string());

            metrics::counter!(counters::ANOMALIES_DETECTED_TOTAL, "domain" => domain.to_string())
                .increment(1);
            return Ok(Some(anomaly));
        }

        if let (Some(metric_name), Some(metric_value)) =
            (record.metric_name.clone(), record.metric_value)
        {
            let anomaly = self.score_metric(
                tracking_id,
                ship_id,
                device_id,
                service,
                domain,
                source,
                metric_name,
                metric_value,
                raw_msg,
            );

            metrics::counter!(counters::ANOMALIES_DETECTED_TOTAL, "domain" => domain.to_string())
                .increment(1);
            return Ok(Some(anomaly));
        }

        debug!("ingest record carries neither a log level nor a metric sample, dropping");
        Ok(None)
    }

    #[allow(clippy::too_many_arguments)]
    fn score_metric(
        &self,
        tracking_id: TrackingId,
        ship_id: String,
        device_id: Option<String>,
        service: String,
        domain: Domain,
        source: ShipIdSource,
        metric_name: String,
        metric_value: f64,
        raw_msg: Value,
    ) -> AnomalyDetected {
        let key = MetricKey {
            ship_id: ship_id.clone(),
            device_id: device_id.clone(),
            metric_name: metric_name.clone(),
        };

        let window_data = {
            let mut window = self
                .windows
                .entry(key)
                .or_insert_with(|| RollingWindow::new(self.config.window_size));
            window.push(metric_value);
            window.data().to_vec()
        };

        let mut detector = self.config.build_detector(&metric_name);
        detector.fit(&window_data);
        let (score, severity) = detector.score(metric_value);

        AnomalyDetected::new(
            tracking_id,
            ship_id,
            device_id,
            service,
            domain,
            detector.detector_type().id(),
            score,
            severity,
            "metric_deviation",
            format!("{metric_name} deviates from baseline"),
            raw_msg,
        )
        .with_metric(metric_name, metric_value)
        .with_meta("ship_id_source", source.to_string())
    }

    /// Resolve `(ship_id, device_id, source)` per spec §4.1's precedence:
    /// a successful registry lookup always wins; otherwise a valid
    /// top-level field wins over a valid metadata-nested field; otherwise
    /// the registry's own hostname-derived fallback (or `unknown-ship` with
    /// no hostname at all).
    async fn resolve_identity(
        &self,
        record: &RawIngestRecord,
    ) -> (String, Option<String>, ShipIdSource) {
        let registry_resolution = self.registry.resolve(record.hostname.as_deref()).await;
        if matches!(registry_resolution.source, ShipIdSource::Registry) {
            return (
                registry_resolution.ship_id,
                registry_resolution.device_id,
                ShipIdSource::Registry,
            );
        }

        if let Some(ship_id) = valid_field(record.ship_id.as_deref()) {
            let device_id = valid_field(record.device_id.as_deref())
                .map(String::from)
                .or_else(|| record.metadata_str("device_id").map(String::from));
            return (ship_id.to_string(), device_id, ShipIdSource::OriginalField);
        }

        if let Some(ship_id) = record.metadata_str("ship_id") {
            let device_id = record.metadata_str("device_id").map(String::from);
            return (ship_id.to_string(), device_id, ShipIdSource::MetadataField);
        }

        (
            registry_resolution.ship_id,
            registry_resolution.device_id,
            registry_resolution.source,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use naas_registry::RegistryClientConfig;
    use serde_json::json;

    fn unreachable_registry() -> Arc<RegistryClient> {
        Arc::new(
            RegistryClient::new(RegistryClientConfig {
                url: "http://127.0.0.1:1".to_string(),
                timeout_secs: 1,
                cache_capacity: 16,
                cache_ttl_secs: 60,
            })
            .unwrap(),
        )
    }

    fn base_record() -> RawIngestRecord {
        RawIngestRecord {
            schema_version: Some(SCHEMA_VERSION.to_string()),
            tracking_id: None,
            ts: None,
            hostname: Some("engine-01".to_string()),
            ship_id: None,
            device_id: None,
            service: Some("engine-monitor".to_string()),
            domain: Some(Domain::System),
            level: None,
            message: None,
            metric_name: None,
            metric_value: None,
            metadata: Value::Null,
            raw: Default::default(),
        }
    }

    #[tokio::test]
    async fn schema_mismatch_is_rejected() {
        let detector = AnomalyDetector::new(unreachable_registry(), DetectionConfig::default());
        let mut record = base_record();
        record.schema_version = Some("1.0".to_string());

        let err = detector.process(record).await.unwrap_err();
        assert!(err.is_dead_letter());
    }

    #[tokio::test]
    async fn filtered_log_record_produces_no_anomaly() {
        let detector = AnomalyDetector::new(unreachable_registry(), DetectionConfig::default());
        let mut record = base_record();
        record.level = Some("INFO".to_string());
        record.message = Some("nothing to see here".to_string());

        let result = detector.process(record).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn critical_log_record_produces_an_anomaly() {
        let detector = AnomalyDetector::new(unreachable_registry(), DetectionConfig::default());
        let mut record = base_record();
        record.level = Some("CRITICAL".to_string());
        record.message = Some("engine room fire suppression triggered".to_string());

        let anomaly = detector.process(record).await.unwrap().unwrap();
        assert_eq!(anomaly.severity, naas_core::types::Severity::Critical);
        assert_eq!(anomaly.detector, "log_level");
    }

    #[tokio::test]
    async fn metric_record_builds_a_window_and_scores_it() {
        let detector = AnomalyDetector::new(unreachable_registry(), DetectionConfig::default());

        for _ in 0..30 {
            let mut record = base_record();
            record.metric_name = Some("latency_ms".to_string());
            record.metric_value = Some(100.0);
            detector.process(record).await.unwrap();
        }

        let mut outlier = base_record();
        outlier.metric_name = Some("latency_ms".to_string());
        outlier.metric_value = Some(100_000.0);

        let anomaly = detector.process(outlier).await.unwrap().unwrap();
        assert_eq!(anomaly.severity, naas_core::types::Severity::Critical);
        assert_eq!(anomaly.metric_name.as_deref(), Some("latency_ms"));
    }

    #[tokio::test]
    async fn original_field_wins_over_metadata_when_valid() {
        let detector = AnomalyDetector::new(unreachable_registry(), DetectionConfig::default());
        let mut record = base_record();
        record.hostname = None;
        record.ship_id = Some("ship-explicit".to_string());
        record.metadata = json!({"ship_id": "ship-from-metadata"});
        record.level = Some("ERROR".to_string());
        record.message = Some("disk failure detected".to_string());

        let anomaly = detector.process(record).await.unwrap().unwrap();
        assert_eq!(anomaly.ship_id, "ship-explicit");
    }

    #[tokio::test]
    async fn metadata_field_wins_when_top_level_is_unknown() {
        let detector = AnomalyDetector::new(unreachable_registry(), DetectionConfig::default());
        let mut record = base_record();
        record.hostname = None;
        record.ship_id = Some("unknown".to_string());
        record.metadata = json!({"ship_id": "ship-from-metadata"});
        record.level = Some("ERROR".to_string());
        record.message = Some("disk failure detected".to_string());

        let anomaly = detector.process(record).await.unwrap().unwrap();
        assert_eq!(anomaly.ship_id, "ship-from-metadata");
    }

    #[tokio::test]
    async fn no_identity_at_all_falls_back_to_unknown_ship() {
        let detector = AnomalyDetector::new(unreachable_registry(), DetectionConfig::default());
        let mut record = base_record();
        record.hostname = None;
        record.level = Some("ERROR".to_string());
        record.message = Some("disk failure detected".to_string());

        let anomaly = detector.process(record).await.unwrap().unwrap();
        assert_eq!(anomaly.ship_id, "unknown-ship");
    }
}
