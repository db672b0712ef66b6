//! # naas-detection
//!
//! The Anomaly Detector (spec §4.1): scores raw log/metric events into
//! `AnomalyDetected`. Log records are scored by a deterministic severity-to-
//! score map ([`log_scoring`]); metric records go through a pluggable
//! `MetricDetector` capability set (`fit(window)`, `score(sample)`), with the
//! concrete variant selected per metric name. Generalizes
//! `sentinel-detection::Detector` trait and `BaselineManager` (per-key
//! rolling state, `DashMap`-backed) from telemetry-event classification into
//! this spec's `{fit, score}` contract.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod detectors;
pub mod log_scoring;
pub mod service;
pub mod stats;

use naas_core::types::Severity;

/// Which concrete metric detector produced a score, recorded on
/// `AnomalyDetected::detector` as a string id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorType {
    /// Rolling window z-score.
    RollingZScore,
    /// Exponentially weighted moving average.
    Ewma,
    /// Fixed, configuration-supplied threshold.
    StaticThreshold,
}

impl DetectorType {
    /// The string id recorded as `AnomalyDetected::detector`.
    pub fn id(&self) -> &'static str {
        match self {
            DetectorType::RollingZScore => "zscore",
            DetectorType::Ewma => "ewma",
            DetectorType::StaticThreshold => "static_threshold",
        }
    }
}

impl std::fmt::Display for DetectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Pluggable metric-detector capability set (spec §4.1: "a pluggable
/// detector interface ... `{fit(window), score(sample)->(score, severity)}`.
/// Variants share the same output contract").
///
/// `fit` is called with the current rolling window before every `score`
/// call; detectors that don't need the window (e.g. [`detectors::static_threshold`])
/// simply ignore it.
pub trait MetricDetector: Send + Sync + std::fmt::Debug {
    /// Recompute internal baseline parameters from the current window.
    fn fit(&mut self, window: &[f64]);

    /// Score a single sample against the last-`fit` baseline. Returns a
    /// score in `[0.0, 1.0]` and its corresponding severity.
    fn score(&self, sample: f64) -> (f64, Severity);

    /// Which variant this is, used as the `detector` id on `AnomalyDetected`.
    fn detector_type(&self) -> DetectorType;
}

/// Re-exported commonly used types.
pub mod prelude {
    pub use crate::detectors::{
        DetectionConfig, EwmaDetector, RollingZScoreDetector, StaticThresholdDetector,
    };
    pub use crate::service::AnomalyDetector;
    pub use crate::{DetectorType, MetricDetector};
}
