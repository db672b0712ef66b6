//! Metric names and label constants shared across every service.
//!
//! These back `metrics::counter!`/`histogram!`/`gauge!` call sites only —
//! there is no scrape endpoint (spec's Non-goals exclude the `/metrics`
//! HTTP surface); instrumentation still runs so the counters are available
//! to whatever process wires in a `metrics::Recorder`.

/// Metrics namespace.
pub const METRICS_NAMESPACE: &str = "naas";

/// Counter metrics.
pub mod counters {
    /// Records dropped for malformed JSON or other non-schema parse errors.
    pub const RECORDS_DROPPED_TOTAL: &str = "records_dropped_total";

    /// Records dead-lettered (schema mismatch or invariant violation).
    pub const RECORDS_DEADLETTERED_TOTAL: &str = "records_deadlettered_total";

    /// Anomalies detected.
    pub const ANOMALIES_DETECTED_TOTAL: &str = "anomalies_detected_total";

    /// Anomalies suppressed by the dedup cache.
    pub const ANOMALIES_DEDUPLICATED_TOTAL: &str = "anomalies_deduplicated_total";

    /// Correlation windows that fired an incident.
    pub const WINDOWS_FIRED_TOTAL: &str = "windows_fired_total";

    /// Correlation windows swept without reaching threshold.
    pub const WINDOWS_EXPIRED_TOTAL: &str = "windows_expired_total";

    /// Incidents created.
    pub const INCIDENTS_CREATED_TOTAL: &str = "incidents_created_total";

    /// Incidents enriched.
    pub const INCIDENTS_PROCESSED_TOTAL: &str = "incidents_processed_total";

    /// LLM response cache hits.
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";

    /// LLM response cache misses.
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";

    /// LLM generation calls issued.
    pub const LLM_CALLS_TOTAL: &str = "llm_calls_total";

    /// Operations that exceeded their per-call budget.
    pub const TIMEOUTS_TOTAL: &str = "timeouts_total";

    /// Dependency calls that failed outright.
    pub const ERRORS_TOTAL: &str = "errors_total";

    /// Device registry lookups that fell back to hostname derivation.
    pub const REGISTRY_FALLBACKS_TOTAL: &str = "registry_fallbacks_total";
}

/// Histogram metrics.
pub mod histograms {
    /// End-to-end ingest-to-incident latency.
    pub const PIPELINE_LATENCY_SECONDS: &str = "pipeline_latency_seconds";

    /// Enrichment barrier latency (join of the four concurrent queries).
    pub const ENRICHMENT_DURATION_SECONDS: &str = "enrichment_duration_seconds";

    /// Incident enrichment pipeline latency, including LLM calls.
    pub const INCIDENT_ENRICHMENT_DURATION_SECONDS: &str =
        "incident_enrichment_duration_seconds";

    /// LLM call latency.
    pub const LLM_CALL_DURATION_SECONDS: &str = "llm_call_duration_seconds";
}

/// Gauge metrics.
pub mod gauges {
    /// Live correlation window partitions.
    pub const ACTIVE_WINDOWS: &str = "active_windows";

    /// Live dedup cache entries.
    pub const DEDUP_CACHE_SIZE: &str = "dedup_cache_size";

    /// Device registry LRU occupancy.
    pub const REGISTRY_CACHE_SIZE: &str = "registry_cache_size";
}

/// Metric labels.
pub mod labels {
    /// Ship id label.
    pub const SHIP_ID: &str = "ship_id";
    /// Domain label.
    pub const DOMAIN: &str = "domain";
    /// Severity label.
    pub const SEVERITY: &str = "severity";
    /// Detector id label.
    pub const DETECTOR: &str = "detector";
    /// Response type label (`root_cause` | `remediation`).
    pub const RESPONSE_TYPE: &str = "response_type";
}

/// Histogram buckets for sub-second latencies.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Histogram buckets for the 10s incident-enrichment budget, in seconds.
pub const ENRICHMENT_BUDGET_BUCKETS: &[f64] =
    &[0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 15.0, 20.0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_constants_are_non_empty() {
        assert_eq!(METRICS_NAMESPACE, "naas");
        assert!(!counters::ANOMALIES_DETECTED_TOTAL.is_empty());
        assert!(!histograms::PIPELINE_LATENCY_SECONDS.is_empty());
        assert!(!gauges::ACTIVE_WINDOWS.is_empty());
    }

    #[test]
    fn buckets_are_sorted() {
        for window in LATENCY_BUCKETS.windows(2) {
            assert!(window[0] < window[1]);
        }
        for window in ENRICHMENT_BUDGET_BUCKETS.windows(2) {
            assert!(window[0] < window[1]);
        }
    }
}
