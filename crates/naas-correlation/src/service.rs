//! The Correlator (spec §4.3): consumes `anomaly.enriched`, deduplicates,
//! windows by `(ship_id, domain)`, and publishes `incidents.created` once a
//! partition reaches the correlation threshold. Grounded in
//! `correlation_service.py`'s `process_anomaly` ordering (suppress check
//! before window add, periodic sweep) and `sentinel-alerting`'s
//! retry-then-deadletter publish pattern.

use crate::dedup::{DedupConfig, DedupStats, DeduplicationCache};
use crate::window::{TimeWindowManager, WindowInfo, WindowStats};
use naas_bus::{subjects, BusPublisher};
use naas_core::config::CorrelationConfig;
use naas_core::events::{AnomalyEnriched, IncidentCreated};
use naas_core::{Error, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

/// Outcome of processing one enriched anomaly.
#[derive(Debug)]
pub enum CorrelationOutcome {
    /// Suppressed as a duplicate within the dedup TTL; no window mutation.
    Suppressed,
    /// Added to its window; threshold not yet reached.
    Windowed,
    /// Window reached threshold and `incidents.created` was published.
    Fired(IncidentCreated),
}

/// Ties deduplication and windowing together and owns the publish of fired
/// incidents (spec §4.3).
#[derive(Debug)]
pub struct Correlator {
    dedup: DeduplicationCache,
    windows: TimeWindowManager,
    bus: Arc<dyn BusPublisher>,
}

impl Correlator {
    pub fn new(config: &CorrelationConfig, bus: Arc<dyn BusPublisher>) -> Self {
        Self {
            dedup: DeduplicationCache::new(DedupConfig {
                ttl_secs: config.dedup_ttl_secs,
            }),
            windows: TimeWindowManager::new(config.window_seconds.clone(), config.threshold),
            bus,
        }
    }

    /// Process one enriched anomaly. Schema mismatches are dead-lettered
    /// without touching dedup or window state (spec §7, §8 inv. ii). A
    /// publish failure on a fired incident restores the evidence into its
    /// partition rather than losing it (spec §4.3: "Publish failure on
    /// `incidents.created` -> the window is NOT cleared"), so a redelivered
    /// anomaly or the next sweep can re-fire the same cluster.
    pub async fn process(&self, anomaly: AnomalyEnriched) -> Result<CorrelationOutcome> {
        if anomaly.anomaly.schema_version != naas_core::events::SCHEMA_VERSION {
            let reason = format!(
                "unrecognized schema_version {}",
                anomaly.anomaly.schema_version
            );
            self.deadletter(subjects::ANOMALY_ENRICHED, &reason, &anomaly).await;
            return Err(Error::schema(reason));
        }

        let suppressed = self.dedup.should_suppress(
            &anomaly.anomaly.ship_id,
            anomaly.anomaly.domain,
            &anomaly.anomaly.service,
            &anomaly.anomaly.anomaly_type,
            anomaly.anomaly.device_id.as_deref(),
            &anomaly.anomaly.severity.to_string(),
        );
        if suppressed {
            return Ok(CorrelationOutcome::Suppressed);
        }

        let fired = self.windows.add_anomaly(&anomaly);
        let Some(fired) = fired else {
            return Ok(CorrelationOutcome::Windowed);
        };

        if fired.evidence.is_empty() {
            return Err(Error::invariant_violation("fired window has zero evidence"));
        }

        let incident = IncidentCreated::from_window(
            fired.ship_id,
            fired.domain,
            fired.evidence,
            &fired.severities,
            fired.window_seconds,
            chrono::Utc::now(),
        );

        let payload = match serde_json::to_vec(&incident) {
            Ok(bytes) => bytes,
            Err(e) => return Err(Error::Serialization(e)),
        };
        match self.bus.publish(subjects::INCIDENTS_CREATED, &payload).await {
            Ok(()) => {
                metrics::counter!(naas_core::metrics::counters::INCIDENTS_CREATED_TOTAL)
                    .increment(1);
                Ok(CorrelationOutcome::Fired(incident))
            }
            Err(e) => {
                error!(error = %e, incident_id = %incident.incident_id, "failed to publish fired incident, restoring window");
                self.windows.restore(
                    &incident.ship_id,
                    incident.incident_type,
                    incident.evidence.clone(),
                    fired.severities,
                );
                self.deadletter(
                    subjects::INCIDENTS_CREATED,
                    &format!("publish failed: {e}"),
                    &incident,
                )
                .await;
                Err(e)
            }
        }
    }

    /// Sweep expired, below-threshold windows and stale dedup entries (spec
    /// §4.3, default interval from `CorrelationConfig::sweep_interval_secs`).
    pub fn sweep(&self) {
        let windows_removed = self.windows.cleanup_expired();
        let dedup_removed = self.dedup.cleanup_expired();
        if windows_removed > 0 || dedup_removed > 0 {
            warn!(windows_removed, dedup_removed, "correlator sweep evicted stale state");
        }
    }

    pub fn window_stats(&self) -> WindowStats {
        self.windows.stats()
    }

    pub fn window_info(&self) -> Vec<WindowInfo> {
        self.windows.window_info()
    }

    pub fn dedup_stats(&self) -> DedupStats {
        self.dedup.stats()
    }

    async fn deadletter(&self, subject: &str, reason: &str, payload: &impl serde::Serialize) {
        let original = serde_json::to_value(payload).unwrap_or(json!(null));
        if let Err(e) = self.bus.publish_deadletter(subject, reason, original).await {
            error!(error = %e, subject, reason, "failed to publish deadletter record");
        }
        metrics::counter!(naas_core::metrics::counters::RECORDS_DEADLETTERED_TOTAL).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use naas_core::events::AnomalyDetected;
    use naas_core::types::{Domain, Severity, TrackingId};
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingBus {
        published: Mutex<Vec<(String, Value)>>,
        deadlettered: Mutex<Vec<(String, String)>>,
        fail_subject: Option<String>,
    }

    #[async_trait]
    impl BusPublisher for RecordingBus {
        async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
            if self.fail_subject.as_deref() == Some(subject) {
                return Err(Error::bus_transient("simulated publish failure"));
            }
            let value: Value = serde_json::from_slice(payload).unwrap();
            self.published.lock().unwrap().push((subject.to_string(), value));
            Ok(())
        }

        async fn publish_deadletter(
            &self,
            subject: &str,
            reason: &str,
            _original: Value,
        ) -> Result<()> {
            self.deadlettered
                .lock()
                .unwrap()
                .push((subject.to_string(), reason.to_string()));
            Ok(())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "recording-bus"
        }
    }

    fn sample_anomaly(ship_id: &str, tracking_id: &str, severity: Severity) -> AnomalyEnriched {
        let anomaly = AnomalyDetected::new(
            TrackingId::from_existing(tracking_id),
            ship_id,
            None,
            "engine-monitor",
            Domain::System,
            "zscore",
            severity.detection_score(),
            severity,
            "metric_deviation",
            "deviation detected",
            Value::Null,
        );
        AnomalyEnriched::new(anomaly)
    }

    fn test_config() -> CorrelationConfig {
        let mut cfg = naas_core::config::Config::default_test().correlation;
        cfg.threshold = 2;
        cfg
    }

    #[tokio::test]
    async fn duplicate_anomaly_is_suppressed_without_window_mutation() {
        let bus = Arc::new(RecordingBus::default());
        let correlator = Correlator::new(&test_config(), bus.clone());

        correlator.process(sample_anomaly("ship-1", "req-1", Severity::Medium)).await.unwrap();
        let outcome = correlator
            .process(sample_anomaly("ship-1", "req-1", Severity::Medium))
            .await
            .unwrap();

        assert!(matches!(outcome, CorrelationOutcome::Suppressed));
        assert_eq!(correlator.window_info()[0].anomaly_count, 1);
    }

    #[tokio::test]
    async fn window_fires_and_publishes_incident() {
        let bus = Arc::new(RecordingBus::default());
        let correlator = Correlator::new(&test_config(), bus.clone());

        correlator.process(sample_anomaly("ship-1", "req-1", Severity::Medium)).await.unwrap();
        let outcome = correlator
            .process(sample_anomaly("ship-1", "req-2", Severity::High))
            .await
            .unwrap();

        match outcome {
            CorrelationOutcome::Fired(incident) => {
                assert_eq!(incident.severity, Severity::High);
                assert_eq!(incident.evidence.len(), 2);
            }
            other => panic!("expected Fired, got {other:?}"),
        }
        assert_eq!(bus.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn schema_mismatch_is_deadlettered_and_does_not_touch_window() {
        let bus = Arc::new(RecordingBus::default());
        let correlator = Correlator::new(&test_config(), bus.clone());

        let mut anomaly = sample_anomaly("ship-1", "req-1", Severity::Medium);
        anomaly.anomaly.schema_version = "2.0".to_string();

        let result = correlator.process(anomaly).await;
        assert!(result.is_err());
        assert_eq!(correlator.window_info().len(), 0);
        assert_eq!(bus.deadlettered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_on_fired_incident_is_deadlettered() {
        let bus = Arc::new(RecordingBus {
            fail_subject: Some(subjects::INCIDENTS_CREATED.to_string()),
            ..Default::default()
        });
        let correlator = Correlator::new(&test_config(), bus.clone());

        correlator.process(sample_anomaly("ship-1", "req-1", Severity::Low)).await.unwrap();
        let result = correlator
            .process(sample_anomaly("ship-1", "req-2", Severity::Low))
            .await;

        assert!(result.is_err());
        assert_eq!(bus.deadlettered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_on_fired_incident_restores_window_evidence() {
        let bus = Arc::new(RecordingBus {
            fail_subject: Some(subjects::INCIDENTS_CREATED.to_string()),
            ..Default::default()
        });
        let correlator = Correlator::new(&test_config(), bus.clone());

        correlator.process(sample_anomaly("ship-1", "req-1", Severity::Low)).await.unwrap();
        let result = correlator
            .process(sample_anomaly("ship-1", "req-2", Severity::Low))
            .await;

        assert!(result.is_err());
        let info = correlator.window_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].anomaly_count, 2, "evidence must survive a failed publish");
    }
}
