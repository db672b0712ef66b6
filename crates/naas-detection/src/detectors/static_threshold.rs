//! Fixed-threshold metric detector (spec §4.1). Ignores the rolling window
//! entirely -- useful for metrics with a known hard limit (e.g. free disk
//! percentage) rather than a learned baseline.

use crate::{DetectorType, MetricDetector};
use naas_core::types::Severity;

/// Flags samples that exceed a configuration-supplied fixed `limit`.
#[derive(Debug, Clone, Copy)]
pub struct StaticThresholdDetector {
    limit: f64,
}

impl StaticThresholdDetector {
    /// Build a detector against a fixed `limit` (spec §4.1's "static
    /// threshold" variant, selected per metric name).
    pub fn new(limit: f64) -> Self {
        Self { limit }
    }
}

impl MetricDetector for StaticThresholdDetector {
    fn fit(&mut self, _window: &[f64]) {
        // Stateless: nothing to learn from the window.
    }

    fn score(&self, sample: f64) -> (f64, Severity) {
        let ratio = if self.limit == 0.0 {
            if sample == 0.0 { 0.0 } else { f64::MAX }
        } else {
            sample / self.limit
        };

        let severity = if ratio >= 3.0 {
            Severity::Critical
        } else if ratio >= 2.0 {
            Severity::High
        } else if ratio >= 1.0 {
            Severity::Medium
        } else {
            Severity::Low
        };

        (severity.detection_score(), severity)
    }

    fn detector_type(&self) -> DetectorType {
        DetectorType::StaticThreshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_under_limit_is_low() {
        let detector = StaticThresholdDetector::new(100.0);
        let (_, severity) = detector.score(50.0);
        assert_eq!(severity, Severity::Low);
    }

    #[test]
    fn sample_over_limit_is_medium_or_worse() {
        let detector = StaticThresholdDetector::new(100.0);
        let (_, severity) = detector.score(150.0);
        assert!(severity >= Severity::Medium);
    }

    #[test]
    fn sample_triple_limit_is_critical() {
        let detector = StaticThresholdDetector::new(100.0);
        let (_, severity) = detector.score(300.0);
        assert_eq!(severity, Severity::Critical);
    }

    #[test]
    fn zero_limit_with_zero_sample_does_not_panic() {
        let detector = StaticThresholdDetector::new(0.0);
        let (_, severity) = detector.score(0.0);
        assert_eq!(severity, Severity::Low);
    }
}
