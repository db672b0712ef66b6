//! Vector similarity store (spec §4.4), ported from `qdrant_rag.py`'s
//! `QdrantRAGClient`. The embedding scheme is carried over unchanged except
//! for `sha2` standing in for the original's `md5` (DESIGN.md) -- a
//! deterministic, non-learned per-dimension hash is a placeholder in both,
//! not a real embedding model (spec §9 Open Question, resolved: keep the
//! deterministic hash rather than pull in a model runtime).

use naas_core::types::Domain;
use naas_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, warn};

/// Vector store settings (spec §4.4, §6).
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub url: String,
    pub collection: String,
    pub dimensions: usize,
    pub search_limit: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "incidents".to_string(),
            dimensions: 384,
            search_limit: 3,
        }
    }
}

/// Incident fields the embedding text is built from
/// (`_generate_simple_embedding`'s `text_parts`).
#[derive(Debug, Clone)]
pub struct IncidentEmbeddingInput {
    pub incident_id: String,
    pub incident_type: Domain,
    pub severity: String,
    pub service: String,
    pub metric_name: Option<String>,
    pub ship_id: String,
    pub resolution: Option<String>,
}

/// Generate the incident's deterministic pseudo-embedding text: the same
/// four fields, space-joined, empties dropped (`_generate_simple_embedding`).
fn embedding_text(incident: &IncidentEmbeddingInput) -> String {
    let parts = [
        incident.incident_type.to_string(),
        incident.severity.clone(),
        incident.service.clone(),
        incident.metric_name.clone().unwrap_or_default(),
    ];
    parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Deterministic per-dimension hash embedding: for dimension `i`, hash
/// `"{text}_{i}"` and scale the first 8 hex digits to `[-1, 1]`
/// (`_generate_simple_embedding`, sha256 replacing md5).
pub fn generate_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    (0..dimensions)
        .map(|i| {
            let seed = format!("{text}_{i}");
            let digest = Sha256::digest(seed.as_bytes());
            let hex_digest = hex::encode(digest);
            let prefix = u32::from_str_radix(&hex_digest[..8], 16).unwrap_or(0);
            (prefix as f64 / 16f64.powi(8) * 2.0 - 1.0) as f32
        })
        .collect()
}

/// Convert text to a deterministic point id within Qdrant's signed-i64 range
/// (`_hash_to_int`).
pub fn hash_to_point_id(text: &str) -> i64 {
    let digest = Sha256::digest(text.as_bytes());
    let hex_digest = hex::encode(digest);
    let value = u64::from_str_radix(&hex_digest[..16], 16).unwrap_or(0);
    (value % (1u64 << 63)) as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarIncidentHit {
    pub incident_id: String,
    pub incident_type: String,
    pub severity: String,
    pub timestamp: String,
    pub similarity_score: f64,
    pub resolution: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    payload: SearchPayload,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPayload {
    #[serde(default = "unknown")]
    incident_id: String,
    #[serde(default = "unknown")]
    incident_type: String,
    #[serde(default = "unknown")]
    severity: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    resolution: Option<String>,
}

fn unknown() -> String {
    "unknown".to_string()
}

#[derive(Debug, Serialize)]
struct UpsertPoint {
    id: i64,
    vector: Vec<f32>,
    payload: UpsertPayload,
}

#[derive(Debug, Serialize)]
struct UpsertPayload {
    incident_id: String,
    incident_type: String,
    severity: String,
    service: String,
    timestamp: String,
    ship_id: String,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    points: Vec<UpsertPoint>,
}

/// HTTP client over a Qdrant-compatible vector store.
#[derive(Debug)]
pub struct VectorStoreClient {
    http: reqwest::Client,
    config: VectorStoreConfig,
}

impl VectorStoreClient {
    pub fn new(config: VectorStoreConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::config(format!("failed to build vector store http client: {e}")))?;
        Ok(Self { http, config })
    }

    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/collections", self.config.url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("vector store health check failed: {e}")))?;
        Ok(())
    }

    /// Create the configured collection if it does not already exist
    /// (`ensure_collection_exists`).
    pub async fn ensure_collection(&self) -> Result<()> {
        let collection_url = format!("{}/collections/{}", self.config.url, self.config.collection);

        let exists = self
            .http
            .get(&collection_url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);

        if exists {
            return Ok(());
        }

        info!(collection = %self.config.collection, "creating vector store collection");
        let response = self
            .http
            .put(&collection_url)
            .json(&serde_json::json!({
                "vectors": { "size": self.config.dimensions, "distance": "Cosine" }
            }))
            .send()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("failed to create collection: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::dependency_unavailable(format!(
                "failed to create collection: status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Nearest-neighbor recall of similar historical incidents
    /// (`search_similar_incidents`). Returns an empty vec on any failure
    /// rather than aborting the incident enrichment pipeline.
    pub async fn search_similar(&self, incident: &IncidentEmbeddingInput) -> Vec<SimilarIncidentHit> {
        let text = embedding_text(incident);
        let vector = generate_embedding(&text, self.config.dimensions);

        let url = format!(
            "{}/collections/{}/points/search",
            self.config.url, self.config.collection
        );

        let response = self
            .http
            .post(&url)
            .json(&SearchRequest {
                vector,
                limit: self.config.search_limit,
                with_payload: true,
            })
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "vector store search returned non-success status");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "vector store search failed");
                return Vec::new();
            }
        };

        let body: SearchResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "malformed vector store search response");
                return Vec::new();
            }
        };

        info!(count = body.result.len(), "found similar incidents");
        body.result
            .into_iter()
            .map(|hit| SimilarIncidentHit {
                incident_id: hit.payload.incident_id,
                incident_type: hit.payload.incident_type,
                severity: hit.payload.severity,
                timestamp: hit.payload.timestamp,
                similarity_score: hit.score,
                resolution: hit.payload.resolution,
            })
            .collect()
    }

    /// Store an incident's embedding for future recall (`store_incident_vector`).
    /// Failures are logged and swallowed -- a missed write degrades future
    /// recall, it does not fail the incident being processed right now.
    pub async fn store_incident(&self, incident: &IncidentEmbeddingInput, timestamp: &str) {
        let text = embedding_text(incident);
        let vector = generate_embedding(&text, self.config.dimensions);
        let point_id = hash_to_point_id(&incident.incident_id);

        let url = format!("{}/collections/{}/points", self.config.url, self.config.collection);
        let result = self
            .http
            .put(&url)
            .json(&UpsertRequest {
                points: vec![UpsertPoint {
                    id: point_id,
                    vector,
                    payload: UpsertPayload {
                        incident_id: incident.incident_id.clone(),
                        incident_type: incident.incident_type.to_string(),
                        severity: incident.severity.clone(),
                        service: incident.service.clone(),
                        timestamp: timestamp.to_string(),
                        ship_id: incident.ship_id.clone(),
                    },
                }],
            })
            .send()
            .await;

        match result {
            Ok(r) if r.status().is_success() => {
                info!(incident_id = %incident.incident_id, "stored incident vector");
            }
            Ok(r) => warn!(status = %r.status(), "failed to store incident vector"),
            Err(e) => warn!(error = %e, "failed to store incident vector"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_incident() -> IncidentEmbeddingInput {
        IncidentEmbeddingInput {
            incident_id: "INC-ship-voyager-net-1700000000".to_string(),
            incident_type: Domain::Net,
            severity: "high".to_string(),
            service: "router-svc".to_string(),
            metric_name: Some("latency_ms".to_string()),
            ship_id: "ship-voyager".to_string(),
            resolution: None,
        }
    }

    #[test]
    fn embedding_is_deterministic_and_right_sized() {
        let incident = sample_incident();
        let text = embedding_text(&incident);
        let a = generate_embedding(&text, 384);
        let b = generate_embedding(&text, 384);
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[test]
    fn embedding_values_are_scaled_to_unit_range() {
        let vector = generate_embedding("net high router-svc latency_ms", 384);
        assert!(vector.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn different_incidents_get_different_embeddings() {
        let mut incident = sample_incident();
        let a = generate_embedding(&embedding_text(&incident), 16);
        incident.severity = "critical".to_string();
        let b = generate_embedding(&embedding_text(&incident), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn point_id_is_deterministic_and_within_i64_range() {
        let a = hash_to_point_id("INC-ship-voyager-net-1700000000");
        let b = hash_to_point_id("INC-ship-voyager-net-1700000000");
        assert_eq!(a, b);
        assert!(a >= 0);
    }
}
