//! Suppression cache guarding against duplicate incident creation (spec
//! §4.3). Generalizes `sentinel-alerting::AlertDeduplicator`
//! (DashMap-keyed, TTL-expiring, background-sweepable) from a per-severity
//! alert-storm guard into this spec's fingerprint-based suppression, and
//! keeps `deduplication.py::get_stats()`'s four counters (SPEC_FULL.md §2).

use crate::fingerprint::suppress_key;
use dashmap::DashMap;
use naas_core::types::Domain;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Deduplication settings (spec §4.3 default TTL 900s).
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// How long a suppression key stays live after first sighting.
    pub ttl_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}

/// Per-fingerprint dedup accounting (`deduplication.py::get_stats()`).
#[derive(Debug, Default)]
pub struct DedupStats {
    /// Every call to `should_suppress`.
    pub total_checks: u64,
    /// Calls that found a live, unexpired suppression key.
    pub duplicates_found: u64,
    /// Calls that recorded a brand-new suppression key.
    pub unique_incidents: u64,
    /// Sweeper passes that removed at least one entry.
    pub cache_cleanups: u64,
}

/// TTL-keyed suppression cache (spec §4.3: "On hit within TTL: the anomaly
/// is suppressed ... On miss: record timestamp and continue").
#[derive(Debug)]
pub struct DeduplicationCache {
    entries: DashMap<String, Instant>,
    config: DedupConfig,
    total_checks: AtomicU64,
    duplicates_found: AtomicU64,
    unique_incidents: AtomicU64,
    cache_cleanups: AtomicU64,
}

impl DeduplicationCache {
    /// Build a cache with the given TTL.
    pub fn new(config: DedupConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            total_checks: AtomicU64::new(0),
            duplicates_found: AtomicU64::new(0),
            unique_incidents: AtomicU64::new(0),
            cache_cleanups: AtomicU64::new(0),
        }
    }

    /// Check whether an anomaly with this identity should be suppressed.
    /// Returns `true` (suppress) on a live hit; records the sighting and
    /// returns `false` on a miss or expired entry.
    #[allow(clippy::too_many_arguments)]
    pub fn should_suppress(
        &self,
        ship_id: &str,
        domain: Domain,
        service: &str,
        anomaly_type: &str,
        device_id: Option<&str>,
        severity: &str,
    ) -> bool {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        let key = suppress_key(ship_id, domain, service, anomaly_type, device_id, severity);
        let ttl = Duration::from_secs(self.config.ttl_secs);
        let now = Instant::now();

        if let Some(last_seen) = self.entries.get(&key) {
            if now.duration_since(*last_seen) < ttl {
                self.duplicates_found.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(naas_core::metrics::counters::ANOMALIES_DEDUPLICATED_TOTAL)
                    .increment(1);
                debug!(suppress_key = %key, "duplicate suppressed");
                return true;
            }
        }

        self.entries.insert(key.clone(), now);
        self.unique_incidents.fetch_add(1, Ordering::Relaxed);
        debug!(suppress_key = %key, "unique anomaly, recorded");
        false
    }

    /// Evict entries past TTL. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let ttl = Duration::from_secs(self.config.ttl_secs);
        let now = Instant::now();
        let before = self.entries.len();

        self.entries.retain(|_, last_seen| now.duration_since(*last_seen) < ttl);

        let removed = before - self.entries.len();
        if removed > 0 {
            self.cache_cleanups.fetch_add(1, Ordering::Relaxed);
            info!(removed, remaining = self.entries.len(), "dedup cache cleanup completed");
        }
        metrics::gauge!(naas_core::metrics::gauges::DEDUP_CACHE_SIZE)
            .set(self.entries.len() as f64);
        removed
    }

    /// Snapshot the four accounting counters plus live cache size.
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            total_checks: self.total_checks.load(Ordering::Relaxed),
            duplicates_found: self.duplicates_found.load(Ordering::Relaxed),
            unique_incidents: self.unique_incidents.load(Ordering::Relaxed),
            cache_cleanups: self.cache_cleanups.load(Ordering::Relaxed),
        }
    }

    /// Number of live suppression keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no suppression keys are currently live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
