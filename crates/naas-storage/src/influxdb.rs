//! InfluxDB realization of [`ColumnarStore`] (DESIGN.md: generalizes
//! `sentinel-storage::influxdb::InfluxDbStorage`'s write path and Flux query
//! building from a telemetry/anomaly time-series store into spec §6's
//! `devices`/`anomalies`/`incidents`/`llm_cache` tables).

use crate::queries::{
    CachedResponse, DeviceMetadata, FailureRate, LlmCacheStats, LlmCacheTypeStats,
    RecentIncidentRecord, SimilarAnomaliesQuery, SimilarAnomalyRecord, TimelineEntry,
};
use crate::ColumnarStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use influxdb2::models::{DataPoint, Query};
use influxdb2::{Client, FromDataPoint};
use naas_core::events::IncidentEnriched;
use naas_core::types::{Domain, Severity};
use naas_core::{Error, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the columnar store (spec §6).
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Store URL.
    pub url: String,
    /// Organization.
    pub org: String,
    /// Bucket holding every table (`devices`, `anomalies`, `incidents`,
    /// `llm_cache` are modeled as InfluxDB measurements within one bucket).
    pub bucket: String,
    /// Auth token.
    pub token: String,
    /// Per-query timeout (spec §4.2: "each executed with a per-query
    /// timeout").
    pub query_timeout_secs: u64,
}

/// Columnar store client.
pub struct InfluxColumnarStore {
    client: Client,
    config: InfluxConfig,
}

impl std::fmt::Debug for InfluxColumnarStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxColumnarStore")
            .field("config", &self.config)
            .finish()
    }
}

/// `devices` row, pivoted so every written field lands in its own column.
#[derive(Debug, Default, FromDataPoint)]
struct DeviceRow {
    device_type: String,
    vendor: String,
    model: String,
    location: String,
    criticality: String,
}

/// One `(severity, count)` pair from a grouped count over `anomalies`.
#[derive(Debug, Default, FromDataPoint)]
struct SeverityCountRow {
    severity: String,
    value: i64,
}

/// A single scalar aggregate row (`mean()`, etc).
#[derive(Debug, Default, FromDataPoint)]
struct ScalarRow {
    value: f64,
}

/// `anomalies` row, pivoted, for the 7-day similar-anomalies lookup.
#[derive(Debug, Default, FromDataPoint)]
struct SimilarAnomalyRow {
    time: DateTime<Utc>,
    severity: String,
    detector: String,
    service: String,
    metric_name: String,
    score: f64,
    metric_value: f64,
}

/// `incidents` row, pivoted, for the 24h recent-incidents lookup.
#[derive(Debug, Default, FromDataPoint)]
struct RecentIncidentRow {
    time: DateTime<Utc>,
    incident_id: String,
    incident_type: String,
    severity: String,
    status: String,
}

/// `llm_cache` row, pivoted, for a single cache-key lookup.
#[derive(Debug, Default, FromDataPoint)]
struct CachedResponseRow {
    time: DateTime<Utc>,
    response_text: String,
    metadata: String,
    expires_at: String,
}

/// `llm_cache` row, pivoted, for the full-table stats scan.
#[derive(Debug, Default, FromDataPoint)]
struct LlmCacheRow {
    response_type: String,
    expires_at: String,
}

impl InfluxColumnarStore {
    /// Connect and verify reachability.
    pub async fn new(config: InfluxConfig) -> Result<Self> {
        info!(url = %config.url, org = %config.org, "connecting to columnar store");
        let client = Client::new(&config.url, &config.org, &config.token);

        client
            .health()
            .await
            .map_err(|e| Error::connection(format!("columnar store connection failed: {e}")))?;

        info!("columnar store connected");
        Ok(Self { client, config })
    }

    /// Run a Flux query under the configured per-query timeout (spec §4.2).
    async fn run_query<T>(&self, flux: &str) -> Result<Vec<T>>
    where
        T: FromDataPoint + Default,
    {
        let budget = Duration::from_secs(self.config.query_timeout_secs);
        tokio::time::timeout(budget, self.client.query::<T>(Some(Query::new(flux.to_string()))))
            .await
            .map_err(|_| Error::dependency_timeout("columnar store query timed out"))?
            .map_err(|e| Error::connection(format!("columnar store query failed: {e}")))
    }

    fn non_empty(s: String) -> Option<String> {
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }
}

#[async_trait]
impl ColumnarStore for InfluxColumnarStore {
    async fn device_metadata(
        &self,
        ship_id: &str,
        device_id: &str,
    ) -> Result<Option<DeviceMetadata>> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
              |> range(start: -30d)
              |> filter(fn: (r) => r._measurement == "devices")
              |> filter(fn: (r) => r.ship_id == "{ship_id}" and r.device_id == "{device_id}")
              |> last()
              |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")"#,
            bucket = self.config.bucket,
        );

        debug!("executing device metadata query for {ship_id}/{device_id}: {flux}");

        let rows: Vec<DeviceRow> = self.run_query(&flux).await?;
        Ok(rows.into_iter().next().map(|r| DeviceMetadata {
            device_type: Self::non_empty(r.device_type),
            vendor: Self::non_empty(r.vendor),
            model: Self::non_empty(r.model),
            location: Self::non_empty(r.location),
            criticality: Self::non_empty(r.criticality),
        }))
    }

    async fn failure_rate_24h(&self, ship_id: &str, domain: Domain) -> Result<FailureRate> {
        let counts_flux = format!(
            r#"from(bucket: "{bucket}")
              |> range(start: -24h)
              |> filter(fn: (r) => r._measurement == "anomalies")
              |> filter(fn: (r) => r.ship_id == "{ship_id}" and r.domain == "{domain}")
              |> filter(fn: (r) => r._field == "score")
              |> group(columns: ["severity"])
              |> count()"#,
            bucket = self.config.bucket,
        );
        let mean_flux = format!(
            r#"from(bucket: "{bucket}")
              |> range(start: -24h)
              |> filter(fn: (r) => r._measurement == "anomalies")
              |> filter(fn: (r) => r.ship_id == "{ship_id}" and r.domain == "{domain}")
              |> filter(fn: (r) => r._field == "score")
              |> mean()"#,
            bucket = self.config.bucket,
        );

        debug!("executing failure rate query for {ship_id}/{domain}: {counts_flux}");

        let counts: Vec<SeverityCountRow> = self.run_query(&counts_flux).await?;
        let avg_score_24h = self
            .run_query::<ScalarRow>(&mean_flux)
            .await?
            .into_iter()
            .next()
            .map(|r| r.value)
            .unwrap_or(0.0);

        let count_for = |severity: &str| {
            counts
                .iter()
                .find(|r| r.severity == severity)
                .map(|r| r.value.max(0) as u64)
                .unwrap_or(0)
        };
        let critical_count_24h = count_for("critical");
        let high_count_24h = count_for("high");
        let medium_count_24h = count_for("medium");
        let low_count_24h = count_for("low");
        let total_anomalies_24h =
            critical_count_24h + high_count_24h + medium_count_24h + low_count_24h;

        Ok(FailureRate {
            total_anomalies_24h,
            critical_count_24h,
            high_count_24h,
            medium_count_24h,
            low_count_24h,
            avg_score_24h,
            failure_rate_per_hour: total_anomalies_24h as f64 / 24.0,
        })
    }

    async fn similar_anomalies_7d(
        &self,
        query: SimilarAnomaliesQuery,
    ) -> Result<Vec<SimilarAnomalyRecord>> {
        let mut flux = format!(
            r#"from(bucket: "{bucket}")
              |> range(start: -7d)
              |> filter(fn: (r) => r._measurement == "anomalies")
              |> filter(fn: (r) => r.ship_id == "{ship_id}" and r.domain == "{domain}" and r.anomaly_type == "{anomaly_type}")"#,
            bucket = self.config.bucket,
            ship_id = query.ship_id,
            domain = query.domain,
            anomaly_type = query.anomaly_type,
        );

        if let Some(metric_name) = &query.metric_name {
            flux.push_str(&format!(
                r#" |> filter(fn: (r) => r.metric_name == "{metric_name}")"#
            ));
        }
        if let Some(service) = &query.service {
            flux.push_str(&format!(r#" |> filter(fn: (r) => r.service == "{service}")"#));
        }
        flux.push_str(&format!(
            " |> sort(columns: [\"_time\"], desc: true) |> limit(n: {})",
            query.limit
        ));
        flux.push_str(r#" |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")"#);

        debug!("executing similar anomalies query for {}: {flux}", query.ship_id);

        let rows: Vec<SimilarAnomalyRow> = self.run_query(&flux).await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let has_metric = !r.metric_name.is_empty();
                SimilarAnomalyRecord {
                    ts: r.time,
                    severity: Severity::from_str(&r.severity).unwrap_or(Severity::Low),
                    score: r.score,
                    detector: r.detector,
                    service: r.service,
                    metric_name: Self::non_empty(r.metric_name),
                    metric_value: has_metric.then_some(r.metric_value),
                }
            })
            .collect())
    }

    async fn recent_incidents_24h(
        &self,
        ship_id: &str,
        domain: Domain,
        limit: usize,
    ) -> Result<Vec<RecentIncidentRecord>> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
              |> range(start: -24h)
              |> filter(fn: (r) => r._measurement == "incidents")
              |> filter(fn: (r) => r.ship_id == "{ship_id}" and r.incident_type == "{domain}")
              |> sort(columns: ["_time"], desc: true)
              |> limit(n: {limit})
              |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")"#,
            bucket = self.config.bucket,
        );

        debug!("executing recent incidents query for {ship_id}/{domain}: {flux}");

        let rows: Vec<RecentIncidentRow> = self.run_query(&flux).await?;
        Ok(rows
            .into_iter()
            .map(|r| RecentIncidentRecord {
                incident_id: r.incident_id,
                incident_type: Domain::from_str(&r.incident_type).unwrap_or(domain),
                severity: Severity::from_str(&r.severity).unwrap_or(Severity::Low),
                status: r.status,
                created_at: r.time,
            })
            .collect())
    }

    async fn upsert_incident(
        &self,
        incident: &IncidentEnriched,
        timeline: &[TimelineEntry],
    ) -> Result<()> {
        let timeline_json = serde_json::to_string(timeline).map_err(Error::Serialization)?;
        let ai_insights_json =
            serde_json::to_string(&incident.ai_insights).map_err(Error::Serialization)?;

        let point = DataPoint::builder("incidents")
            .tag("incident_id", incident.incident.incident_id.as_str())
            .tag("ship_id", incident.incident.ship_id.as_str())
            .tag("incident_type", incident.incident.incident_type.to_string())
            .tag("severity", incident.incident.severity.to_string())
            .tag("status", incident.incident.status.to_string())
            .field("summary", incident.incident.summary.as_str())
            .field("timeline", timeline_json.as_str())
            .field("ai_insights", ai_insights_json.as_str())
            .field("cache_hit", incident.cache_hit)
            .field("processing_time_ms", incident.processing_time_ms as i64)
            .timestamp(incident.incident.ts.timestamp_nanos_opt().unwrap_or(0))
            .build()
            .map_err(|e| Error::connection(format!("failed to build incident point: {e}")))?;

        self.client
            .write(&self.config.bucket, futures::stream::iter(vec![point]))
            .await
            .map_err(|e| Error::connection(format!("incident upsert failed: {e}")))?;

        debug!(incident_id = %incident.incident.incident_id, "upserted incident");
        metrics::counter!("columnar_store_writes_total", "table" => "incidents").increment(1);
        Ok(())
    }

    async fn get_cached_llm_response(&self, cache_key: &str) -> Result<Option<CachedResponse>> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
              |> range(start: -48h)
              |> filter(fn: (r) => r._measurement == "llm_cache")
              |> filter(fn: (r) => r.cache_key == "{cache_key}")
              |> sort(columns: ["_time"], desc: true)
              |> limit(n: 1)
              |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")"#,
            bucket = self.config.bucket,
        );

        debug!("executing llm cache lookup for {cache_key}: {flux}");

        let rows: Vec<CachedResponseRow> = self.run_query(&flux).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let expired = DateTime::parse_from_rfc3339(&row.expires_at)
            .map(|dt| dt.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(true);
        if expired {
            return Ok(None);
        }

        Ok(Some(CachedResponse {
            response_text: row.response_text,
            metadata: serde_json::from_str(&row.metadata).unwrap_or(serde_json::Value::Null),
            created_at: row.time,
        }))
    }

    async fn store_llm_response(
        &self,
        cache_key: &str,
        incident_type: &str,
        response_type: &str,
        response_text: &str,
        metadata: serde_json::Value,
        ttl_hours: u64,
    ) -> Result<()> {
        let expires_at = Utc::now() + chrono::Duration::hours(ttl_hours as i64);
        let metadata_json = serde_json::to_string(&metadata).map_err(Error::Serialization)?;

        let point = DataPoint::builder("llm_cache")
            .tag("cache_key", cache_key)
            .tag("incident_type", incident_type)
            .tag("response_type", response_type)
            .field("response_text", response_text)
            .field("metadata", metadata_json.as_str())
            .field("expires_at", expires_at.to_rfc3339().as_str())
            .timestamp(Utc::now().timestamp_nanos_opt().unwrap_or(0))
            .build()
            .map_err(|e| Error::connection(format!("failed to build cache point: {e}")))?;

        self.client
            .write(&self.config.bucket, futures::stream::iter(vec![point]))
            .await
            .map_err(|e| Error::connection(format!("llm cache write failed: {e}")))?;

        debug!(cache_key, response_type, "stored llm response in cache");
        metrics::counter!("columnar_store_writes_total", "table" => "llm_cache").increment(1);
        Ok(())
    }

    async fn llm_cache_stats(&self) -> Result<LlmCacheStats> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
              |> range(start: -30d)
              |> filter(fn: (r) => r._measurement == "llm_cache")
              |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")"#,
            bucket = self.config.bucket,
        );

        debug!("executing llm cache stats query: {flux}");

        let rows: Vec<LlmCacheRow> = self.run_query(&flux).await?;
        let now = Utc::now();
        let mut by_type: HashMap<String, LlmCacheTypeStats> = HashMap::new();
        for row in rows {
            let entry = by_type.entry(row.response_type).or_default();
            entry.total += 1;
            let expired = DateTime::parse_from_rfc3339(&row.expires_at)
                .map(|dt| dt.with_timezone(&Utc) <= now)
                .unwrap_or(true);
            if expired {
                entry.expired += 1;
            } else {
                entry.valid += 1;
            }
        }

        Ok(LlmCacheStats {
            by_type,
            ..Default::default()
        }
        .finalize())
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .health()
            .await
            .map_err(|e| Error::connection(format!("columnar store health check failed: {e}")))?;
        Ok(())
    }
}
