//! LLM response cache key derivation (spec §4.4.1), ported verbatim from
//! `llm_cache.py::_generate_cache_key` with `sha256` in place of the
//! original's already-used-elsewhere hash (the dependency stack already
//! carries `sha2` for fingerprinting; DESIGN.md notes the substitution).

use sha2::{Digest, Sha256};

/// Build the cache key for one `(response_type, incident_type, severity,
/// service, metric_name)` tuple: `{response_type}_{sha256[:16]}`.
pub fn cache_key(
    response_type: &str,
    incident_type: &str,
    severity: &str,
    service: &str,
    metric_name: Option<&str>,
) -> String {
    let key_string = format!(
        "{}|{}|{}|{}|{}",
        response_type,
        incident_type,
        severity,
        service,
        metric_name.unwrap_or("")
    );

    let digest = Sha256::digest(key_string.as_bytes());
    let hex_digest = hex::encode(digest);

    format!("{response_type}_{}", &hex_digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic() {
        let a = cache_key("root_cause", "net", "high", "router-svc", Some("latency_ms"));
        let b = cache_key("root_cause", "net", "high", "router-svc", Some("latency_ms"));
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_is_prefixed_with_response_type() {
        let key = cache_key("remediation", "net", "high", "router-svc", None);
        assert!(key.starts_with("remediation_"));
        assert_eq!(key.len(), "remediation_".len() + 16);
    }

    #[test]
    fn cache_key_differs_on_metric_name() {
        let a = cache_key("root_cause", "net", "high", "router-svc", Some("latency_ms"));
        let b = cache_key("root_cause", "net", "high", "router-svc", Some("jitter_ms"));
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_differs_on_response_type() {
        let a = cache_key("root_cause", "net", "high", "router-svc", None);
        let b = cache_key("remediation", "net", "high", "router-svc", None);
        assert_ne!(a, b);
    }
}
