//! # naas-llm
//!
//! The Incident Enricher (spec §4.4): generates AI root-cause and
//! remediation text via a local LLM server, recalls similar historical
//! incidents via vector similarity, and caches generated responses to avoid
//! redundant calls. Ported from `ollama_client.py`, `qdrant_rag.py`, and
//! `llm_cache.py`.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod ollama;
pub mod service;
pub mod vector_store;

pub use ollama::{IncidentPromptContext, OllamaClient, OllamaConfig};
pub use service::{IncidentEnricher, IncidentEnricherStatsSnapshot};
pub use vector_store::{IncidentEmbeddingInput, SimilarIncidentHit, VectorStoreClient, VectorStoreConfig};
