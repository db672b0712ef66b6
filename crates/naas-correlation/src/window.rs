//! Time-windowed anomaly clustering (spec §4.3), ported from
//! `windowing.py`'s `AnomalyWindow`/`TimeWindowManager` -- same
//! `{ship_id}:{domain}` partition key, same clear-not-delete semantics when
//! a window reaches threshold, same expire-without-reaching-threshold
//! cleanup sweep.

use naas_core::config::WindowDurations;
use naas_core::events::{AnomalyEnriched, Evidence};
use naas_core::types::{Domain, Severity};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One `(ship_id, domain)` partition's accumulated evidence.
#[derive(Debug)]
struct AnomalyWindow {
    window_seconds: u64,
    created_at: Instant,
    evidence: Vec<Evidence>,
    severities: Vec<Severity>,
}

impl AnomalyWindow {
    fn new(window_seconds: u64) -> Self {
        Self {
            window_seconds,
            created_at: Instant::now(),
            evidence: Vec::new(),
            severities: Vec::new(),
        }
    }

    fn push(&mut self, anomaly: &AnomalyEnriched) {
        self.evidence.push(Evidence {
            tracking_id: anomaly.anomaly.tracking_id.clone(),
            ts: anomaly.anomaly.ts,
            detector: anomaly.anomaly.detector.clone(),
            score: anomaly.anomaly.score,
            msg: anomaly.anomaly.msg.clone(),
        });
        self.severities.push(anomaly.anomaly.severity);
    }

    fn count(&self) -> usize {
        self.evidence.len()
    }

    /// Clears accumulated evidence in place, returning what was there (spec
    /// §4.3: "clear, not delete" -- the partition stays alive for the next
    /// cluster).
    fn take(&mut self) -> (Vec<Evidence>, Vec<Severity>) {
        (
            std::mem::take(&mut self.evidence),
            std::mem::take(&mut self.severities),
        )
    }

    /// Prepends previously-taken evidence back onto whatever has
    /// accumulated since (spec §4.3: a failed `incidents.created` publish
    /// must not lose the fired cluster's evidence).
    fn restore(&mut self, mut evidence: Vec<Evidence>, mut severities: Vec<Severity>) {
        evidence.append(&mut self.evidence);
        self.evidence = evidence;
        severities.append(&mut self.severities);
        self.severities = severities;
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > Duration::from_secs(self.window_seconds)
    }

    fn age_seconds(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }
}

/// A fired cluster ready to become an `IncidentCreated` (spec §4.3).
#[derive(Debug)]
pub struct FiredWindow {
    pub ship_id: String,
    pub domain: Domain,
    pub evidence: Vec<Evidence>,
    pub severities: Vec<Severity>,
    pub window_seconds: u64,
}

/// Read-only snapshot of one live partition (`windowing.py::get_window_info`,
/// SPEC_FULL.md §2 window introspection).
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub window_key: String,
    pub anomaly_count: usize,
    pub age_seconds: f64,
    pub window_seconds: u64,
}

/// Windowing accounting (`windowing.py::get_stats`).
#[derive(Debug, Default, Clone)]
pub struct WindowStats {
    pub total_anomalies: u64,
    pub windows_created: u64,
    pub windows_triggered: u64,
    pub windows_expired: u64,
    pub cleanups_performed: u64,
}

fn window_key(ship_id: &str, domain: Domain) -> String {
    format!("{ship_id}:{domain}")
}

/// Manages per-`(ship_id, domain)` time windows and fires a cluster once a
/// partition reaches the correlation threshold (spec §4.3).
#[derive(Debug)]
pub struct TimeWindowManager {
    windows: RwLock<HashMap<String, AnomalyWindow>>,
    durations: WindowDurations,
    threshold: usize,
    stats: RwLock<WindowStats>,
}

impl TimeWindowManager {
    pub fn new(durations: WindowDurations, threshold: usize) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            durations,
            threshold,
            stats: RwLock::new(WindowStats::default()),
        }
    }

    /// Add an enriched anomaly to its partition. Returns `Some(FiredWindow)`
    /// once the partition's count reaches the configured threshold, having
    /// already cleared the partition in place.
    pub fn add_anomaly(&self, anomaly: &AnomalyEnriched) -> Option<FiredWindow> {
        let ship_id = anomaly.anomaly.ship_id.clone();
        let domain = anomaly.anomaly.domain;
        let key = window_key(&ship_id, domain);
        let window_seconds = self.durations.for_domain(domain);

        let mut windows = self.windows.write().expect("window map poisoned");
        let mut stats = self.stats.write().expect("window stats poisoned");
        stats.total_anomalies += 1;

        let window = windows.entry(key.clone()).or_insert_with(|| {
            stats.windows_created += 1;
            debug!(window_key = %key, duration_seconds = window_seconds, "created new window");
            AnomalyWindow::new(window_seconds)
        });

        window.push(anomaly);
        debug!(
            window_key = %key,
            count = window.count(),
            threshold = self.threshold,
            tracking_id = %anomaly.anomaly.tracking_id,
            "anomaly added to window"
        );

        metrics::gauge!(naas_core::metrics::gauges::ACTIVE_WINDOWS).set(windows.len() as f64);

        if window.count() >= self.threshold {
            stats.windows_triggered += 1;
            let (evidence, severities) = window.take();
            info!(
                window_key = %key,
                anomaly_count = evidence.len(),
                threshold = self.threshold,
                "window threshold reached"
            );
            metrics::counter!(naas_core::metrics::counters::WINDOWS_FIRED_TOTAL).increment(1);

            return Some(FiredWindow {
                ship_id,
                domain,
                evidence,
                severities,
                window_seconds,
            });
        }

        None
    }

    /// Restore a fired cluster's evidence into its partition after a
    /// downstream publish failure (spec §4.3: "Publish failure on
    /// `incidents.created` -> the window is NOT cleared", at-least-once
    /// redelivery). Re-creates the partition if it was otherwise evicted in
    /// the interim.
    pub fn restore(
        &self,
        ship_id: &str,
        domain: Domain,
        evidence: Vec<Evidence>,
        severities: Vec<Severity>,
    ) {
        if evidence.is_empty() {
            return;
        }
        let key = window_key(ship_id, domain);
        let window_seconds = self.durations.for_domain(domain);

        let mut windows = self.windows.write().expect("window map poisoned");
        let window = windows
            .entry(key.clone())
            .or_insert_with(|| AnomalyWindow::new(window_seconds));
        window.restore(evidence, severities);
        debug!(window_key = %key, count = window.count(), "window restored after publish failure");
        metrics::gauge!(naas_core::metrics::gauges::ACTIVE_WINDOWS).set(windows.len() as f64);
    }

    /// Evict partitions past their window duration that never reached
    /// threshold. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().expect("window map poisoned");

        let expired: Vec<String> = windows
            .iter()
            .filter(|(_, w)| w.is_expired(now))
            .map(|(key, w)| {
                if w.count() > 0 {
                    info!(
                        window_key = %key,
                        anomaly_count = w.count(),
                        age_seconds = w.age_seconds(),
                        "window expired without reaching threshold"
                    );
                }
                key.clone()
            })
            .collect();

        for key in &expired {
            windows.remove(key);
        }

        let removed = expired.len();
        if removed > 0 {
            let mut stats = self.stats.write().expect("window stats poisoned");
            stats.windows_expired += removed as u64;
            stats.cleanups_performed += 1;
            metrics::counter!(naas_core::metrics::counters::WINDOWS_EXPIRED_TOTAL)
                .increment(removed as u64);
            info!(removed, remaining = windows.len(), "window cleanup completed");
        }
        metrics::gauge!(naas_core::metrics::gauges::ACTIVE_WINDOWS).set(windows.len() as f64);
        removed
    }

    /// Snapshot accounting counters.
    pub fn stats(&self) -> WindowStats {
        self.stats.read().expect("window stats poisoned").clone()
    }

    /// Snapshot every live partition (introspection, SPEC_FULL.md §2).
    pub fn window_info(&self) -> Vec<WindowInfo> {
        self.windows
            .read()
            .expect("window map poisoned")
            .iter()
            .map(|(key, w)| WindowInfo {
                window_key: key.clone(),
                anomaly_count: w.count(),
                age_seconds: w.age_seconds(),
                window_seconds: w.window_seconds,
            })
            .collect()
    }

    /// Number of live partitions.
    pub fn active_window_count(&self) -> usize {
        self.windows.read().expect("window map poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use naas_core::events::AnomalyDetected;
    use naas_core::types::TrackingId;
    use serde_json::Value;

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

    #[test]
    fn window_does_not_fire_below_threshold() {
        let manager = TimeWindowManager::new(WindowDurations::default(), 3);
        let fired = manager.add_anomaly(&sample_anomaly("ship-1", "req-1", Severity::Medium));
        assert!(fired.is_none());
        assert_eq!(manager.active_window_count(), 1);
    }

    #[test]
    fn window_fires_and_clears_at_threshold() {
        let manager = TimeWindowManager::new(WindowDurations::default(), 2);
        manager.add_anomaly(&sample_anomaly("ship-1", "req-1", Severity::Medium));
        let fired = manager
            .add_anomaly(&sample_anomaly("ship-1", "req-2", Severity::High))
            .expect("window should fire");

        assert_eq!(fired.evidence.len(), 2);
        assert_eq!(fired.ship_id, "ship-1");
        // partition stays alive, cleared, for the next cluster
        assert_eq!(manager.active_window_count(), 1);

        let fired_again = manager.add_anomaly(&sample_anomaly("ship-1", "req-3", Severity::Low));
        assert!(fired_again.is_none());
    }

    #[test]
    fn different_domains_or_ships_get_separate_partitions() {
        let manager = TimeWindowManager::new(WindowDurations::default(), 5);
        manager.add_anomaly(&sample_anomaly("ship-1", "req-1", Severity::Low));
        manager.add_anomaly(&sample_anomaly("ship-2", "req-2", Severity::Low));
        assert_eq!(manager.active_window_count(), 2);
    }

    #[test]
    fn cleanup_evicts_expired_partitions_below_threshold() {
        let mut durations = WindowDurations::default();
        durations.system = 0;
        let manager = TimeWindowManager::new(durations, 10);
        manager.add_anomaly(&sample_anomaly("ship-1", "req-1", Severity::Low));
        std::thread::sleep(Duration::from_millis(5));

        let removed = manager.cleanup_expired();
        assert_eq!(removed, 1);
        assert_eq!(manager.active_window_count(), 0);
        assert_eq!(manager.stats().windows_expired, 1);
    }

    #[test]
    fn window_info_reports_live_partitions() {
        let manager = TimeWindowManager::new(WindowDurations::default(), 10);
        manager.add_anomaly(&sample_anomaly("ship-1", "req-1", Severity::Low));

        let info = manager.window_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].window_key, "ship-1:system");
        assert_eq!(info[0].anomaly_count, 1);
    }
}
