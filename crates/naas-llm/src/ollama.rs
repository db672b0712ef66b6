//! Local LLM client (spec §4.4), ported from `ollama_client.py`'s
//! `OllamaClient`: one `/api/generate` call per prompt, sequential root
//! cause then remediation, same prompt templates translated verbatim.

use naas_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Ollama client settings (spec §4.4, §6).
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    pub call_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "phi3:mini".to_string(),
            call_timeout_secs: 10,
        }
    }
}

/// Incident fields the prompt templates read (spec §4.4's root-cause and
/// remediation prompts, mirroring `_build_root_cause_prompt`/
/// `_build_remediation_prompt`).
#[derive(Debug, Clone)]
pub struct IncidentPromptContext {
    pub incident_type: String,
    pub severity: String,
    pub service: String,
    pub metric_name: Option<String>,
    pub metric_value: Option<f64>,
    /// `(device_id, service)` pairs for every piece of evidence.
    pub scope: Vec<(Option<String>, String)>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// HTTP client over a local Ollama-compatible generation server.
#[derive(Debug)]
pub struct OllamaClient {
    http: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build ollama http client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Reachability check against `/api/tags`.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.config.url);
        self.http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("ollama health check failed: {e}")))?;
        Ok(())
    }

    /// Root-cause analysis, 2-3 sentences (spec §4.4). `Err` on timeout or
    /// non-success status; callers fall back to templated text.
    pub async fn generate_root_cause_analysis(
        &self,
        incident: &IncidentPromptContext,
    ) -> Result<String> {
        let prompt = build_root_cause_prompt(incident);
        self.generate(prompt, "root cause analysis").await
    }

    /// Remediation suggestions, optionally informed by a prior root cause
    /// (spec §4.4).
    pub async fn generate_remediation_suggestions(
        &self,
        incident: &IncidentPromptContext,
        root_cause: Option<&str>,
    ) -> Result<String> {
        let prompt = build_remediation_prompt(incident, root_cause);
        self.generate(prompt, "remediation suggestions").await
    }

    async fn generate(&self, prompt: String, label: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.url);
        let started = Instant::now();

        let response = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                model: &self.config.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::dependency_timeout(format!("ollama {label} request timed out"))
                } else {
                    Error::dependency_unavailable(format!("ollama unreachable: {e}"))
                }
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), label, "ollama returned non-success status");
            return Err(Error::dependency_unavailable(format!(
                "ollama api error: {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::dependency_unavailable(format!("malformed ollama response: {e}")))?;

        info!(label, duration_ms = started.elapsed().as_millis(), "llm generation completed");
        Ok(body.response.trim().to_string())
    }
}

fn scope_str(scope: &[(Option<String>, String)]) -> String {
    scope
        .iter()
        .map(|(device_id, service)| format!("{}/{service}", device_id.as_deref().unwrap_or("N/A")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_root_cause_prompt(incident: &IncidentPromptContext) -> String {
    format!(
        "Analyze this maritime AIOps incident and provide a concise root cause analysis.\n\n\
         Incident Details:\n\
         - Type: {}\n\
         - Severity: {}\n\
         - Affected Service: {}\n\
         - Metric: {} = {}\n\
         - Affected Scope: {}\n\n\
         Provide a brief root cause analysis (2-3 sentences) focusing on:\n\
         1. What is the most likely root cause\n\
         2. Why this issue occurred\n\
         3. What system component is affected\n\n\
         Keep the response concise and actionable.",
        incident.incident_type,
        incident.severity,
        incident.service,
        incident.metric_name.as_deref().unwrap_or("N/A"),
        incident
            .metric_value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        scope_str(&incident.scope),
    )
}

fn build_remediation_prompt(incident: &IncidentPromptContext, root_cause: Option<&str>) -> String {
    let root_cause_str = root_cause
        .map(|rc| format!("\n\nRoot Cause: {rc}"))
        .unwrap_or_default();

    format!(
        "Based on this maritime AIOps incident, suggest remediation actions.\n\n\
         Incident Details:\n\
         - Type: {}\n\
         - Severity: {}\n\
         - Affected Service: {}{root_cause_str}\n\n\
         Provide 2-3 specific remediation steps that operators should take.\n\
         Focus on maritime-specific actions (satellite links, network equipment, ship operations).\n\
         Keep each step brief and actionable.",
        incident.incident_type, incident.severity, incident.service,
    )
}
