//! Core type definitions shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// High-level system area. Determines correlation windowing and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Communication links (radio, VSAT voice).
    Comms,
    /// Network equipment and links.
    Net,
    /// Host/OS level issues.
    System,
    /// Application-level issues.
    App,
    /// Security-relevant events.
    Security,
    /// Satellite link issues.
    Satellite,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Comms => write!(f, "comms"),
            Domain::Net => write!(f, "net"),
            Domain::System => write!(f, "system"),
            Domain::App => write!(f, "app"),
            Domain::Security => write!(f, "security"),
            Domain::Satellite => write!(f, "satellite"),
        }
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comms" => Ok(Domain::Comms),
            "net" => Ok(Domain::Net),
            "system" => Ok(Domain::System),
            "app" => Ok(Domain::App),
            "security" => Ok(Domain::Security),
            "satellite" => Ok(Domain::Satellite),
            other => Err(format!("unknown domain: {other}")),
        }
    }
}

/// Totally-ordered severity. `low < medium < high < critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Low,
    /// Warning.
    Medium,
    /// Requires attention.
    High,
    /// Requires immediate action.
    Critical,
}

impl Severity {
    /// Numeric priority used for max-aggregation. Never panics on comparison
    /// because `Severity` has no null variant; callers handling optional
    /// severities should default missing values to `Low` before calling this.
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    /// Deterministic anomaly score for this severity, per the detector's
    /// scoring policy.
    pub fn detection_score(&self) -> f64 {
        match self {
            Severity::Low => 0.5,
            Severity::Medium => 0.7,
            Severity::High => 0.85,
            Severity::Critical => 0.95,
        }
    }

    /// Maps a raw log level string to severity. Unrecognized levels default
    /// to `Low` (never null).
    pub fn from_log_level(level: &str) -> Self {
        match level.to_ascii_uppercase().as_str() {
            "CRITICAL" | "FATAL" => Severity::Critical,
            "ERROR" => Severity::High,
            "WARN" | "WARNING" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Incident lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// Newly created, unacknowledged.
    Open,
    /// Acknowledged by an operator.
    Ack,
    /// Resolved.
    Resolved,
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentStatus::Open => write!(f, "open"),
            IncidentStatus::Ack => write!(f, "ack"),
            IncidentStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// How `ship_id` was ultimately resolved for a record, recorded in `meta`
/// for debugging (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipIdSource {
    /// Present and usable on the record's top-level field.
    OriginalField,
    /// Present and usable under the record's `metadata` object.
    MetadataField,
    /// Resolved via the Device Registry Client.
    Registry,
    /// Derived by splitting the hostname on `-`.
    HostnameFallback,
    /// No hostname was available to derive from.
    NoHostname,
}

impl fmt::Display for ShipIdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShipIdSource::OriginalField => "original_field",
            ShipIdSource::MetadataField => "metadata_field",
            ShipIdSource::Registry => "registry",
            ShipIdSource::HostnameFallback => "hostname_fallback",
            ShipIdSource::NoHostname => "no_hostname",
        };
        write!(f, "{s}")
    }
}

/// Opaque, URL-safe tracking identifier propagated unchanged through every
/// derived record (spec §GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingId(String);

impl TrackingId {
    /// Mint a fresh tracking id: `req-<unix-millis>-<random-hex>`.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let rand = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("req-{millis}-{}", &rand[..12]))
    }

    /// Wrap an existing tracking id string (e.g. one carried on an inbound
    /// record).
    pub fn from_existing(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TrackingId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TrackingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn severity_priority_matches_ordering() {
        assert_eq!(Severity::Low.priority(), 1);
        assert_eq!(Severity::Critical.priority(), 4);
    }

    #[test]
    fn severity_from_log_level() {
        assert_eq!(Severity::from_log_level("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_log_level("ERROR"), Severity::High);
        assert_eq!(Severity::from_log_level("WARN"), Severity::Medium);
        assert_eq!(Severity::from_log_level("INFO"), Severity::Low);
        assert_eq!(Severity::from_log_level("garbage"), Severity::Low);
    }

    #[test]
    fn severity_default_is_low_never_null() {
        assert_eq!(Severity::default(), Severity::Low);
    }

    #[test]
    fn severity_serde_roundtrip() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"high\"");
        let back: Severity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Severity::High);
    }

    #[test]
    fn domain_display_and_parse() {
        assert_eq!(Domain::Satellite.to_string(), "satellite");
        assert_eq!("net".parse::<Domain>().unwrap(), Domain::Net);
        assert!("bogus".parse::<Domain>().is_err());
    }

    #[test]
    fn tracking_id_preserves_existing_value() {
        let id = TrackingId::from_existing("req-123-abc");
        assert_eq!(id.as_str(), "req-123-abc");
    }

    #[test]
    fn tracking_id_generate_is_prefixed() {
        let id = TrackingId::generate();
        assert!(id.as_str().starts_with("req-"));
    }
}
