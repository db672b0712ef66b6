//! Rolling latency histogram backing the Enricher's stats interface (spec
//! §4.2: "maintains a rolling latency histogram and exposes p95/p99").

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Bounded rolling sample set. Oldest samples are dropped once `capacity` is
/// exceeded so the histogram tracks recent behavior rather than a
/// lifetime average.
#[derive(Debug)]
pub struct LatencyHistogram {
    samples: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl LatencyHistogram {
    /// Build a histogram retaining the most recent `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record one observation.
    pub fn record(&self, duration: Duration) {
        let millis = duration.as_secs_f64() * 1000.0;
        let mut samples = self.samples.lock().expect("latency histogram poisoned");
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(millis);
    }

    /// Number of samples currently retained.
    pub fn len(&self) -> usize {
        self.samples.lock().expect("latency histogram poisoned").len()
    }

    /// True when no samples have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// p95 latency in milliseconds, `0.0` when empty.
    pub fn p95(&self) -> f64 {
        self.percentile(0.95)
    }

    /// p99 latency in milliseconds, `0.0` when empty.
    pub fn p99(&self) -> f64 {
        self.percentile(0.99)
    }

    fn percentile(&self, p: f64) -> f64 {
        let samples = self.samples.lock().expect("latency histogram poisoned");
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rank = ((sorted.len() as f64) * p).ceil() as usize;
        let index = rank.saturating_sub(1).min(sorted.len() - 1);
        sorted[index]
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_reports_zero() {
        let histogram = LatencyHistogram::new(16);
        assert_eq!(histogram.p95(), 0.0);
        assert_eq!(histogram.p99(), 0.0);
    }

    #[test]
    fn percentiles_track_inserted_samples() {
        let histogram = LatencyHistogram::new(128);
        for ms in 1..=100 {
            histogram.record(Duration::from_millis(ms));
        }
        assert!((histogram.p95() - 95.0).abs() <= 1.0);
        assert!((histogram.p99() - 99.0).abs() <= 1.0);
    }

    #[test]
    fn capacity_evicts_oldest_samples() {
        let histogram = LatencyHistogram::new(4);
        for ms in [1, 2, 3, 4, 1000] {
            histogram.record(Duration::from_millis(ms));
        }
        assert_eq!(histogram.len(), 4);
        // the 1ms outlier sample was evicted; p99 should not reflect 1000ms
        assert!(histogram.p99() < 1000.0);
    }
}
