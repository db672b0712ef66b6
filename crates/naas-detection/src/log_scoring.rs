//! Log-record scoring and filtering (spec §4.1): severity is lifted from the
//! record's log level, then normal-operational noise is dropped before an
//! anomaly is ever built.

use naas_core::types::Severity;

/// Log levels that never produce an anomaly, regardless of message text.
const SUPPRESSED_LEVELS: &[&str] = &["INFO", "DEBUG", "TRACE"];

/// Substrings (case-insensitive) identifying routine operational noise --
/// startup banners and heartbeat confirmations (spec §4.1) -- that are
/// dropped even at a level that would otherwise anomaly.
const ALLOW_LIST: &[&str] = &[
    "starting up",
    "startup complete",
    "service started",
    "heartbeat",
    "health check ok",
    "ping ok",
];

/// Decide whether a log record should produce an anomaly, and at what
/// severity. Returns `None` when the record is filtered: suppressed level,
/// or message text matching the normal-operational allow-list.
pub fn classify(level: &str, message: &str) -> Option<Severity> {
    let upper_level = level.to_ascii_uppercase();
    if SUPPRESSED_LEVELS.contains(&upper_level.as_str()) {
        return None;
    }

    let lower_message = message.to_ascii_lowercase();
    if ALLOW_LIST.iter().any(|pattern| lower_message.contains(pattern)) {
        return None;
    }

    Some(Severity::from_log_level(level))
}
