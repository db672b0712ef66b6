//! Metric detector variants and their selection table (spec §4.1).

pub mod ewma;
pub mod static_threshold;
pub mod zscore;

pub use ewma::EwmaDetector;
pub use static_threshold::StaticThresholdDetector;
pub use zscore::RollingZScoreDetector;

use crate::{DetectorType, MetricDetector};
use std::collections::HashMap;

/// Per-metric-name detector selection plus shared tuning knobs (spec §4.1:
/// "variants ... selected by metric name via a configuration table").
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Rolling window capacity fed to `fit` (spec default 30 samples).
    pub window_size: usize,
    /// Z-score sigma threshold for [`RollingZScoreDetector`] (default 3.0).
    pub zscore_threshold: f64,
    /// Smoothing factor for [`EwmaDetector`] (default 0.3).
    pub ewma_alpha: f64,
    /// Sigma threshold applied to the EWMA baseline (default 3.0).
    pub ewma_threshold: f64,
    /// `metric_name -> detector variant` selection table.
    pub metric_variants: HashMap<String, DetectorType>,
    /// `metric_name -> fixed limit`, consulted only for metrics mapped to
    /// [`DetectorType::StaticThreshold`].
    pub static_limits: HashMap<String, f64>,
    /// Variant used for a metric name absent from `metric_variants`.
    pub default_variant: DetectorType,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            zscore_threshold: 3.0,
            ewma_alpha: 0.3,
            ewma_threshold: 3.0,
            metric_variants: HashMap::new(),
            static_limits: HashMap::new(),
            default_variant: DetectorType::RollingZScore,
        }
    }
}

impl DetectionConfig {
    /// Build the concrete detector for `metric_name`, consulting
    /// `metric_variants` and falling back to `default_variant`.
    pub fn build_detector(&self, metric_name: &str) -> Box<dyn MetricDetector> {
        let variant = self
            .metric_variants
            .get(metric_name)
            .copied()
            .unwrap_or(self.default_variant);

        match variant {
            DetectorType::RollingZScore => {
                Box::new(RollingZScoreDetector::new(self.zscore_threshold))
            }
            DetectorType::Ewma => Box::new(EwmaDetector::new(self.ewma_alpha, self.ewma_threshold)),
            DetectorType::StaticThreshold => {
                let limit = self.static_limits.get(metric_name).copied().unwrap_or(f64::MAX);
                Box::new(StaticThresholdDetector::new(limit))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_variant_is_rolling_zscore() {
        let config = DetectionConfig::default();
        let detector = config.build_detector("latency_ms");
        assert_eq!(detector.detector_type(), DetectorType::RollingZScore);
    }

    #[test]
    fn metric_variants_table_overrides_default() {
        let mut config = DetectionConfig::default();
        config
            .metric_variants
            .insert("cpu_pct".to_string(), DetectorType::Ewma);
        let detector = config.build_detector("cpu_pct");
        assert_eq!(detector.detector_type(), DetectorType::Ewma);
    }

    #[test]
    fn static_threshold_picks_up_configured_limit() {
        let mut config = DetectionConfig::default();
        config
            .metric_variants
            .insert("queue_depth".to_string(), DetectorType::StaticThreshold);
        config.static_limits.insert("queue_depth".to_string(), 10.0);

        let detector = config.build_detector("queue_depth");
        let (_, severity) = detector.score(25.0);
        assert!(severity >= naas_core::types::Severity::Medium);
    }
}
