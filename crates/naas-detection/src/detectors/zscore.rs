//! Rolling z-score metric detector (spec §4.1), generalized from
//! `sentinel-detection::detectors::zscore::ZScoreDetector` -- same
//! sigma-threshold severity ladder, but fit against an externally supplied
//! window rather than an internally owned baseline manager.

use crate::{stats, DetectorType, MetricDetector};
use naas_core::types::Severity;

/// Detects samples that are more than `threshold` standard deviations from
/// the fitted window's mean.
#[derive(Debug, Clone)]
pub struct RollingZScoreDetector {
    threshold: f64,
    mean: f64,
    std_dev: f64,
}

impl RollingZScoreDetector {
    /// Build a detector with the given sigma threshold (spec default 3.0).
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            mean: 0.0,
            std_dev: 0.0,
        }
    }

    /// Z-score severity ladder: `>=2x` threshold is critical, `>=4/3`
    /// threshold is high, above threshold is medium, otherwise low.
    fn severity_for(&self, z_abs: f64) -> Severity {
        if z_abs >= self.threshold * 2.0 {
            Severity::Critical
        } else if z_abs >= self.threshold * (4.0 / 3.0) {
            Severity::High
        } else if z_abs >= self.threshold {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl MetricDetector for RollingZScoreDetector {
    fn fit(&mut self, window: &[f64]) {
        self.mean = stats::mean(window);
        self.std_dev = stats::std_dev(window);
    }

    fn score(&self, sample: f64) -> (f64, Severity) {
        if self.std_dev == 0.0 {
            return (Severity::Low.detection_score(), Severity::Low);
        }

        let z = stats::zscore(sample, self.mean, self.std_dev);
        let severity = self.severity_for(z.abs());
        (severity.detection_score(), severity)
    }

    fn detector_type(&self) -> DetectorType {
        DetectorType::RollingZScore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted(window: &[f64], threshold: f64) -> RollingZScoreDetector {
        let mut detector = RollingZScoreDetector::new(threshold);
        detector.fit(window);
        detector
    }

    #[test]
    fn unfitted_window_never_flags_an_outlier() {
        let detector = RollingZScoreDetector::new(3.0);
        let (_, severity) = detector.score(1000.0);
        assert_eq!(severity, Severity::Low);
    }

    #[test]
    fn sample_within_baseline_is_low() {
        let window: Vec<f64> = (0..30).map(|i| 100.0 + (i % 3) as f64).collect();
        let detector = fitted(&window, 3.0);
        let (_, severity) = detector.score(101.0);
        assert_eq!(severity, Severity::Low);
    }

    #[test]
    fn extreme_outlier_is_critical() {
        let window: Vec<f64> = (0..30).map(|i| 100.0 + (i % 3) as f64).collect();
        let detector = fitted(&window, 3.0);
        let (score, severity) = detector.score(100_000.0);
        assert_eq!(severity, Severity::Critical);
        assert!((score - Severity::Critical.detection_score()).abs() < 1e-9);
    }

    #[test]
    fn detector_type_is_rolling_zscore() {
        let detector = RollingZScoreDetector::new(3.0);
        assert_eq!(detector.detector_type(), DetectorType::RollingZScore);
    }
}
