//! # naas-registry
//!
//! Device Registry Client (spec §4.7): resolves a hostname to
//! `{ship_id, device_id}` over HTTP, with a positive-result-only LRU cache
//! and a deterministic hostname-derived fallback when the registry is
//! unreachable or returns a miss.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

use moka::future::Cache;
use naas_core::types::ShipIdSource;
use naas_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registry client settings.
#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// Registry base URL.
    pub url: String,
    /// Per-lookup timeout (spec default 5s).
    pub timeout_secs: u64,
    /// LRU capacity for positive results (spec default 1024).
    pub cache_capacity: u64,
    /// LRU TTL for positive results (spec default 60s).
    pub cache_ttl_secs: u64,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000".to_string(),
            timeout_secs: 5,
            cache_capacity: 1024,
            cache_ttl_secs: 60,
        }
    }
}

/// Raw device mapping returned by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMapping {
    /// Resolved ship id.
    pub ship_id: String,
    /// Resolved device id, if the registry has one on file.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Any additional fields the registry returns, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    success: bool,
    #[serde(default)]
    mapping: Option<DeviceMapping>,
}

/// Outcome of a ship-id resolution, carrying both the result and which path
/// produced it (spec §4.1's debug-only `meta.ship_id_source`).
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Resolved ship id. Never empty (spec §8 invariant vi).
    pub ship_id: String,
    /// Resolved device id, if known.
    pub device_id: Option<String>,
    /// Which path produced this resolution.
    pub source: ShipIdSource,
}

/// Derive a ship id from a hostname alone, with no network call: split on
/// `-` and suffix the first token with `-ship`; a bare hostname becomes
/// `{hostname}-ship`; no hostname at all becomes `unknown-ship` (spec §4.1).
pub fn hostname_fallback(hostname: Option<&str>) -> Resolution {
    let Some(hostname) = hostname else {
        return Resolution {
            ship_id: "unknown-ship".to_string(),
            device_id: None,
            source: ShipIdSource::NoHostname,
        };
    };

    let first_token = hostname.split('-').next().unwrap_or(hostname);
    Resolution {
        ship_id: format!("{first_token}-ship"),
        device_id: None,
        source: ShipIdSource::HostnameFallback,
    }
}

/// HTTP client over the Device Registry, backed by a positive-only LRU.
#[derive(Debug)]
pub struct RegistryClient {
    http: reqwest::Client,
    config: RegistryClientConfig,
    cache: Cache<String, DeviceMapping>,
}

impl RegistryClient {
    /// Build a client with its own connection pool and LRU cache.
    pub fn new(config: RegistryClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build registry http client: {e}")))?;

        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Ok(Self {
            http,
            config,
            cache,
        })
    }

    /// Look up a hostname against the registry, consulting the LRU first.
    /// Returns `Ok(None)` on a registry miss or `success: false`; returns
    /// `Err` only on timeout/connection failure so callers can distinguish
    /// "registry said no" from "registry unreachable" (spec §4.1, §7).
    pub async fn lookup(&self, hostname: &str) -> Result<Option<DeviceMapping>> {
        if let Some(cached) = self.cache.get(hostname).await {
            metrics::counter!("registry_cache_hits_total").increment(1);
            debug!(hostname, "registry cache hit");
            return Ok(Some(cached));
        }
        metrics::counter!("registry_cache_misses_total").increment(1);

        let url = format!("{}/lookup/{}", self.config.url, hostname);
        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::dependency_timeout(format!("registry lookup for {hostname} timed out"))
            } else {
                Error::dependency_unavailable(format!("registry unreachable: {e}"))
            }
        })?;

        if !response.status().is_success() {
            warn!(hostname, status = %response.status(), "registry returned non-success status");
            return Ok(None);
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("malformed registry response: {e}")))?;

        if !body.success {
            return Ok(None);
        }

        if let Some(mapping) = body.mapping {
            self.cache.insert(hostname.to_string(), mapping.clone()).await;
            Ok(Some(mapping))
        } else {
            Ok(None)
        }
    }

    /// Resolve `ship_id`/`device_id` for a hostname, falling back through the
    /// exact chain pinned by `original_source/tests/ship-id-fix`:
    /// registry → hostname split on `-` (first token + `-ship`) → a bare
    /// hostname (no `-`) becomes `{hostname}-ship` → `unknown-ship` if there
    /// is no hostname at all. Never returns an empty `ship_id`.
    pub async fn resolve(&self, hostname: Option<&str>) -> Resolution {
        let Some(hostname) = hostname else {
            return hostname_fallback(None);
        };

        match self.lookup(hostname).await {
            Ok(Some(mapping)) => {
                return Resolution {
                    ship_id: mapping.ship_id,
                    device_id: mapping.device_id,
                    source: ShipIdSource::Registry,
                };
            }
            Ok(None) => {
                debug!(hostname, "registry miss, falling back to hostname derivation");
            }
            Err(e) => {
                metrics::counter!(naas_core::metrics::counters::REGISTRY_FALLBACKS_TOTAL)
                    .increment(1);
                warn!(hostname, error = %e, "registry unavailable, falling back to hostname derivation");
            }
        }

        hostname_fallback(Some(hostname))
    }

    /// Health check: a reachable registry, regardless of lookup outcome.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/lookup/health-check", self.config.url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("registry health check failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: String) -> RegistryClientConfig {
        RegistryClientConfig {
            url,
            timeout_secs: 1,
            cache_capacity: 1024,
            cache_ttl_secs: 60,
        }
    }

    #[tokio::test]
    async fn registry_hit_resolves_ship_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup/engine-01.voyager"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "mapping": {"ship_id": "ship-voyager", "device_id": "engine-01"}
            })))
            .mount(&server)
            .await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let resolution = client.resolve(Some("engine-01.voyager")).await;

        assert_eq!(resolution.ship_id, "ship-voyager");
        assert_eq!(resolution.device_id.as_deref(), Some("engine-01"));
        assert!(matches!(resolution.source, ShipIdSource::Registry));
    }

    #[tokio::test]
    async fn registry_miss_falls_back_to_hostname_split() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup/dhruv-system-01"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let resolution = client.resolve(Some("dhruv-system-01")).await;

        assert_eq!(resolution.ship_id, "dhruv-ship");
        assert!(matches!(resolution.source, ShipIdSource::HostnameFallback));
    }

    #[tokio::test]
    async fn registry_outage_falls_back_to_hostname_split() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup/sat-gw-04"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let resolution = client.resolve(Some("sat-gw-04")).await;

        assert_eq!(resolution.ship_id, "sat-ship");
    }

    #[tokio::test]
    async fn no_hostname_falls_back_to_unknown_ship() {
        let client = RegistryClient::new(test_config("http://localhost:1".to_string())).unwrap();
        let resolution = client.resolve(None).await;

        assert_eq!(resolution.ship_id, "unknown-ship");
        assert!(matches!(resolution.source, ShipIdSource::NoHostname));
    }

    #[tokio::test]
    async fn hostname_without_dash_gets_ship_suffix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup/bridge"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RegistryClient::new(test_config(server.uri())).unwrap();
        let resolution = client.resolve(Some("bridge")).await;

        assert_eq!(resolution.ship_id, "bridge-ship");
    }
}
