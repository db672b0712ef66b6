//! Configuration for the maritime AIOps pipeline.
//!
//! Loaded from environment variables only (`NAAS_`-prefixed), never from a
//! file — the Non-goals explicitly exclude YAML configuration loading, and
//! every field below is named in spec §6's environment variable list.

use crate::error::Result;
use figment::{providers::Env, Figment};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Root configuration tree, assembled once at startup and shared read-only
/// across every worker task.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// This service's own HTTP port (used only for the liveness probe, not
    /// the excluded stats/metrics scaffolding).
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    /// Message bus connection.
    #[validate(nested)]
    pub bus: BusConfig,

    /// Columnar store connection (backs Enricher reads, Persistor writes,
    /// LLM cache).
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Device Registry Client.
    #[validate(nested)]
    pub registry: RegistryConfig,

    /// Local LLM server.
    #[validate(nested)]
    pub llm: LlmConfig,

    /// Vector store.
    #[validate(nested)]
    pub vector_store: VectorStoreConfig,

    /// Correlator windowing and deduplication.
    #[validate(nested)]
    pub correlation: CorrelationConfig,

    /// Structured logging.
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// Message bus connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BusConfig {
    /// `BUS_URL` (spec §6), e.g. `amqp://rabbitmq:5672`.
    #[validate(length(min = 1))]
    pub url: String,

    /// Topic exchange every subject is published/subscribed through.
    #[validate(length(min = 1))]
    pub exchange: String,

    /// Max publish attempts before a record is dead-lettered (spec §7:
    /// `BusTransientError` retries up to 5 then dead-letters).
    #[validate(range(min = 1, max = 5))]
    pub max_publish_attempts: u32,

    /// Initial backoff delay in milliseconds.
    #[validate(range(min = 1))]
    pub retry_initial_delay_ms: u64,
}

/// Columnar store credentials and pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    /// Store URL.
    #[validate(url)]
    pub url: String,

    /// Organization / namespace.
    #[validate(length(min = 1))]
    pub org: String,

    /// Bucket / database name.
    #[validate(length(min = 1))]
    pub bucket: String,

    /// Auth token.
    #[validate(length(min = 1))]
    pub token: String,

    /// Per-query timeout.
    #[validate(range(min = 1))]
    pub query_timeout_secs: u64,

    /// Pooled connections checked out per query (spec §5 default 8).
    #[validate(range(min = 1))]
    pub pool_size: usize,

    /// LLM response cache TTL in hours (spec §4.4 default 24).
    #[validate(range(min = 1))]
    pub llm_cache_ttl_hours: u64,
}

/// Device Registry Client settings (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegistryConfig {
    /// Registry base URL.
    #[validate(url)]
    pub url: String,

    /// Lookup timeout in seconds (spec default 5).
    #[validate(range(min = 1))]
    pub timeout_secs: u64,

    /// Positive-result LRU capacity (spec default 1024).
    #[validate(range(min = 1))]
    pub cache_capacity: u64,

    /// Positive-result TTL in seconds (spec default 60).
    #[validate(range(min = 1))]
    pub cache_ttl_secs: u64,
}

/// Local LLM server settings (spec §4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LlmConfig {
    /// Base URL, e.g. `http://ollama:11434`.
    #[validate(url)]
    pub url: String,

    /// Model name, e.g. `phi3:mini`.
    #[validate(length(min = 1))]
    pub model: String,

    /// Per-call timeout in seconds (spec default 10).
    #[validate(range(min = 1))]
    pub call_timeout_secs: u64,

    /// Concurrency cap against the local server (spec §5 default 4).
    #[validate(range(min = 1))]
    pub max_concurrency: usize,
}

/// Vector store settings (spec §4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VectorStoreConfig {
    /// Base URL.
    #[validate(url)]
    pub url: String,

    /// Collection name (spec: `incidents`).
    #[validate(length(min = 1))]
    pub collection: String,

    /// Vector dimensionality (spec: 384).
    #[validate(range(min = 1))]
    pub dimensions: usize,

    /// Nearest-neighbor recall limit (spec default 3).
    #[validate(range(min = 1))]
    pub search_limit: usize,
}

/// Correlator window durations, threshold, and dedup TTLs (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CorrelationConfig {
    /// Number of anomalies in a partition that fires a window (default 3).
    #[validate(range(min = 1))]
    pub threshold: usize,

    /// Per-domain window durations in seconds.
    #[validate(nested)]
    pub window_seconds: WindowDurations,

    /// Sweeper interval in seconds (default 60).
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,

    /// Dedup cache TTL in seconds (default 900).
    #[validate(range(min = 1))]
    pub dedup_ttl_secs: u64,

    /// Incident enricher hard wall-clock budget in seconds (default 10).
    #[validate(range(min = 1))]
    pub enrichment_budget_secs: u64,
}

/// Per-domain window durations (spec §4.3 defaults).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WindowDurations {
    /// `comms` domain window, seconds.
    pub comms: u64,
    /// `net` domain window, seconds.
    pub net: u64,
    /// `system` domain window, seconds.
    pub system: u64,
    /// `app` domain window, seconds.
    pub app: u64,
    /// `security` domain window, seconds.
    pub security: u64,
    /// `satellite` domain window, seconds.
    pub satellite: u64,
    /// Fallback window for any domain not listed above.
    pub default: u64,
}

impl Default for WindowDurations {
    fn default() -> Self {
        Self {
            comms: 300,
            net: 300,
            system: 600,
            app: 1200,
            security: 600,
            satellite: 300,
            default: 900,
        }
    }
}

impl WindowDurations {
    /// Resolve the configured window duration for a domain.
    pub fn for_domain(&self, domain: crate::types::Domain) -> u64 {
        use crate::types::Domain;
        match domain {
            Domain::Comms => self.comms,
            Domain::Net => self.net,
            Domain::System => self.system,
            Domain::App => self.app,
            Domain::Security => self.security,
            Domain::Satellite => self.satellite,
        }
    }
}

/// Structured logging settings (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// `json` or `text`.
    pub log_format: String,

    /// `trace|debug|info|warn|error`.
    pub log_level: String,
}

impl Config {
    /// Load configuration from `NAAS_`-prefixed environment variables only.
    pub fn from_env() -> Result<Self> {
        Figment::new()
            .merge(Env::prefixed("NAAS_").split("__"))
            .extract()
            .map_err(|e| crate::Error::config(format!("failed to load config: {e}")))
    }

    /// A fully populated configuration for tests, matching spec defaults.
    pub fn default_test() -> Self {
        Self {
            port: 8080,
            bus: BusConfig {
                url: "amqp://localhost:5672".to_string(),
                exchange: "naas.events".to_string(),
                max_publish_attempts: 5,
                retry_initial_delay_ms: 1000,
            },
            storage: StorageConfig {
                url: "http://localhost:8086".to_string(),
                org: "naas".to_string(),
                bucket: "naas-pipeline".to_string(),
                token: "test-token".to_string(),
                query_timeout_secs: 5,
                pool_size: 8,
                llm_cache_ttl_hours: 24,
            },
            registry: RegistryConfig {
                url: "http://localhost:9000".to_string(),
                timeout_secs: 5,
                cache_capacity: 1024,
                cache_ttl_secs: 60,
            },
            llm: LlmConfig {
                url: "http://localhost:11434".to_string(),
                model: "phi3:mini".to_string(),
                call_timeout_secs: 10,
                max_concurrency: 4,
            },
            vector_store: VectorStoreConfig {
                url: "http://localhost:6333".to_string(),
                collection: "incidents".to_string(),
                dimensions: 384,
                search_limit: 3,
            },
            correlation: CorrelationConfig {
                threshold: 3,
                window_seconds: WindowDurations::default(),
                sweep_interval_secs: 60,
                dedup_ttl_secs: 900,
                enrichment_budget_secs: 10,
            },
            observability: ObservabilityConfig {
                log_format: "json".to_string(),
                log_level: "info".to_string(),
            },
        }
    }

    /// Validate configuration, returning a `Validation` error on failure.
    pub fn validate_config(&self) -> Result<()> {
        self.validate()
            .map_err(|e| crate::Error::validation(format!("config validation failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Domain;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default_test();
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn invalid_port_fails_validation() {
        let mut config = Config::default_test();
        config.port = 0;
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn window_durations_match_spec_defaults() {
        let windows = WindowDurations::default();
        assert_eq!(windows.for_domain(Domain::Net), 300);
        assert_eq!(windows.for_domain(Domain::App), 1200);
        assert_eq!(windows.default, 900);
    }
}
