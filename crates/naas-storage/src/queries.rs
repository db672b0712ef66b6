//! Query and result types for the columnar store's read/write surface
//! (spec §4.2, §6). Mirrors the shape of `clickhouse_queries.py`'s functions
//! one-for-one, translated from ClickHouse SQL to InfluxDB Flux (DESIGN.md).

use chrono::{DateTime, Utc};
use naas_core::types::{Domain, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `devices` table row, keyed by `(ship_id, device_id)` (spec §4.2.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// Device category.
    pub device_type: Option<String>,
    /// Manufacturer.
    pub vendor: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Physical/logical location aboard ship.
    pub location: Option<String>,
    /// Criticality rating.
    pub criticality: Option<String>,
}

/// 24-hour failure-rate aggregate over `anomalies`, keyed by `(ship_id,
/// domain)` (spec §4.2.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRate {
    /// Total anomalies in the last 24h.
    pub total_anomalies_24h: u64,
    /// Count by severity.
    pub critical_count_24h: u64,
    /// Count by severity.
    pub high_count_24h: u64,
    /// Count by severity.
    pub medium_count_24h: u64,
    /// Count by severity.
    pub low_count_24h: u64,
    /// Mean anomaly score over the window.
    pub avg_score_24h: f64,
    /// `total_anomalies_24h / 24.0`.
    pub failure_rate_per_hour: f64,
}

impl FailureRate {
    /// An all-zero aggregate, returned on a query miss or failure.
    pub fn empty() -> Self {
        Self {
            total_anomalies_24h: 0,
            critical_count_24h: 0,
            high_count_24h: 0,
            medium_count_24h: 0,
            low_count_24h: 0,
            avg_score_24h: 0.0,
            failure_rate_per_hour: 0.0,
        }
    }
}

/// One row from the 7-day similar-anomalies lookup (spec §4.2.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarAnomalyRecord {
    /// Timestamp of the historical anomaly.
    pub ts: DateTime<Utc>,
    /// Severity.
    pub severity: Severity,
    /// Score.
    pub score: f64,
    /// Detector id.
    pub detector: String,
    /// Service name.
    pub service: String,
    /// Metric name, if any.
    pub metric_name: Option<String>,
    /// Metric value, if any.
    pub metric_value: Option<f64>,
}

/// Filters for the 7-day similar-anomalies query.
#[derive(Debug, Clone)]
pub struct SimilarAnomaliesQuery {
    /// Ship id.
    pub ship_id: String,
    /// Domain.
    pub domain: Domain,
    /// Anomaly type tag.
    pub anomaly_type: String,
    /// Optional metric-name filter.
    pub metric_name: Option<String>,
    /// Optional service filter.
    pub service: Option<String>,
    /// Result cap (spec default 10).
    pub limit: usize,
}

/// One row from the 24h recent-incidents lookup (spec §4.2.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentIncidentRecord {
    /// Incident id.
    pub incident_id: String,
    /// Domain.
    pub incident_type: Domain,
    /// Severity.
    pub severity: Severity,
    /// Lifecycle status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One state transition recorded in an incident's append-only timeline
/// (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// New status as of this transition.
    pub status: String,
    /// When the transition occurred.
    pub at: DateTime<Utc>,
    /// Free-form note (e.g. "created", "ai insights attached").
    pub note: String,
}

/// A cached LLM response (spec §4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// The cached text.
    pub response_text: String,
    /// Arbitrary metadata stored alongside the response.
    pub metadata: serde_json::Value,
    /// When this entry was written.
    pub created_at: DateTime<Utc>,
}

/// Per-`response_type` cache accounting, supplementing spec.md from
/// `llm_cache.py`'s `get_cache_stats()` (SPEC_FULL.md §2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCacheTypeStats {
    /// Total entries ever written for this response type.
    pub total: u64,
    /// Entries still within TTL.
    pub valid: u64,
    /// Entries past TTL (eligible for eviction).
    pub expired: u64,
}

/// LLM response cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCacheStats {
    /// Stats broken down by `response_type`.
    pub by_type: HashMap<String, LlmCacheTypeStats>,
    /// Sum of `by_type[*].total`.
    pub total_entries: u64,
    /// Sum of `by_type[*].valid`.
    pub valid_entries: u64,
    /// `valid_entries / total_entries * 100`, `0.0` when empty.
    pub hit_rate_pct: f64,
}

impl LlmCacheStats {
    /// Recompute `total_entries`/`valid_entries`/`hit_rate_pct` from
    /// `by_type`.
    pub fn finalize(mut self) -> Self {
        self.total_entries = self.by_type.values().map(|s| s.total).sum();
        self.valid_entries = self.by_type.values().map(|s| s.valid).sum();
        self.hit_rate_pct = if self.total_entries == 0 {
            0.0
        } else {
            (self.valid_entries as f64 / self.total_entries as f64) * 100.0
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_rate_empty_is_zeroed() {
        let rate = FailureRate::empty();
        assert_eq!(rate.total_anomalies_24h, 0);
        assert_eq!(rate.failure_rate_per_hour, 0.0);
    }

    #[test]
    fn cache_stats_finalize_computes_hit_rate() {
        let mut by_type = HashMap::new();
        by_type.insert(
            "root_cause".to_string(),
            LlmCacheTypeStats {
                total: 10,
                valid: 8,
                expired: 2,
            },
        );
        let stats = LlmCacheStats {
            by_type,
            ..Default::default()
        }
        .finalize();

        assert_eq!(stats.total_entries, 10);
        assert_eq!(stats.valid_entries, 8);
        assert!((stats.hit_rate_pct - 80.0).abs() < 1e-9);
    }

    #[test]
    fn cache_stats_finalize_empty_is_zero_rate() {
        let stats = LlmCacheStats::default().finalize();
        assert_eq!(stats.hit_rate_pct, 0.0);
    }
}
