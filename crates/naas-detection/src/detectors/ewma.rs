//! Exponentially weighted moving average metric detector (spec §4.1).

use crate::{DetectorType, MetricDetector};
use naas_core::types::Severity;

/// Detects samples that deviate from an exponentially weighted moving
/// average/variance fitted over the window, rather than a flat mean -- more
/// responsive to recent drift than [`super::zscore::RollingZScoreDetector`].
#[derive(Debug, Clone)]
pub struct EwmaDetector {
    alpha: f64,
    threshold: f64,
    ewma: f64,
    ewm_variance: f64,
}

impl EwmaDetector {
    /// Build a detector with smoothing factor `alpha` in `(0.0, 1.0]` and a
    /// sigma `threshold` applied to the EWMA baseline.
    pub fn new(alpha: f64, threshold: f64) -> Self {
        Self {
            alpha,
            threshold,
            ewma: 0.0,
            ewm_variance: 0.0,
        }
    }
}

impl MetricDetector for EwmaDetector {
    fn fit(&mut self, window: &[f64]) {
        let Some((first, rest)) = window.split_first() else {
            self.ewma = 0.0;
            self.ewm_variance = 0.0;
            return;
        };

        let mut ewma = *first;
        let mut ewm_variance = 0.0;
        for &sample in rest {
            let delta = sample - ewma;
            ewma += self.alpha * delta;
            ewm_variance = (1.0 - self.alpha) * (ewm_variance + self.alpha * delta * delta);
        }

        self.ewma = ewma;
        self.ewm_variance = ewm_variance;
    }

    fn score(&self, sample: f64) -> (f64, Severity) {
        let ewm_std = self.ewm_variance.sqrt();
        if ewm_std == 0.0 {
            return (Severity::Low.detection_score(), Severity::Low);
        }

        let z_abs = ((sample - self.ewma) / ewm_std).abs();
        let severity = if z_abs >= self.threshold * 2.0 {
            Severity::Critical
        } else if z_abs >= self.threshold * (4.0 / 3.0) {
            Severity::High
        } else if z_abs >= self.threshold {
            Severity::Medium
        } else {
            Severity::Low
        };

        (severity.detection_score(), severity)
    }

    fn detector_type(&self) -> DetectorType {
        DetectorType::Ewma
    }
}
