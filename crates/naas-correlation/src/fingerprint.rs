//! Deduplication fingerprinting (spec §4.3, §GLOSSARY), ported from
//! `deduplication.py::compute_fingerprint`/`compute_suppress_key` with
//! `sha2` standing in for the original's `md5` -- the dependency stack
//! already carries `sha2`/`hex` for [`naas_storage::cache_key`] rather than
//! adding an MD5 crate for this one call site (DESIGN.md).

use naas_core::types::Domain;
use sha2::{Digest, Sha256};

/// Fingerprint input: `(ship_id, domain, service, anomaly_type, device_id?)`
/// (spec §4.3, §GLOSSARY).
pub fn fingerprint(
    ship_id: &str,
    domain: Domain,
    service: &str,
    anomaly_type: &str,
    device_id: Option<&str>,
) -> String {
    let mut parts = vec![
        ship_id.to_string(),
        domain.to_string(),
        service.to_string(),
        anomaly_type.to_string(),
    ];
    if let Some(device_id) = device_id {
        parts.push(device_id.to_string());
    }

    let joined = parts.join(":");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Suppression key: `{fingerprint}:{severity}` -- different severities of
/// the same fingerprint produce separate incidents (spec §4.3).
pub fn suppress_key(
    ship_id: &str,
    domain: Domain,
    service: &str,
    anomaly_type: &str,
    device_id: Option<&str>,
    severity: &str,
) -> String {
    format!(
        "{}:{}",
        fingerprint(ship_id, domain, service, anomaly_type, device_id),
        severity
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("ship-1", Domain::Comms, "radio", "packet_loss", None);
        let b = fingerprint("ship-1", Domain::Comms, "radio", "packet_loss", None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn fingerprint_differs_with_device_id() {
        let a = fingerprint("ship-1", Domain::Comms, "radio", "packet_loss", None);
        let b = fingerprint("ship-1", Domain::Comms, "radio", "packet_loss", Some("radio-01"));
        assert_ne!(a, b);
    }

    #[test]
    fn suppress_key_separates_different_severities() {
        let fp = fingerprint("ship-1", Domain::Net, "router", "latency_spike", None);
        let high = suppress_key("ship-1", Domain::Net, "router", "latency_spike", None, "high");
        let medium = suppress_key("ship-1", Domain::Net, "router", "latency_spike", None, "medium");
        assert_ne!(high, medium);
        assert!(high.starts_with(&fp));
    }
}
