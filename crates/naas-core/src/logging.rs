//! Structured logging initialization and tracking-id propagation.
//!
//! A tracking id is carried as a `tracing::Span` field rather than a
//! bespoke context type: every per-message handler opens a span via
//! [`tracked_operation`], and every `info!`/`warn!`/`error!` emitted while
//! that span is entered carries `tracking_id` automatically (spec §4.6).

use crate::error::Result;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format, selected once at startup (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Newline-delimited JSON objects.
    Json,
    /// Human-readable key=value lines.
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Initialize the global `tracing` subscriber. Call once at process start.
pub fn init(level: &str, format: LogFormat) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| crate::Error::config(format!("invalid log level: {level}")))?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(true)
                        .with_span_list(true),
                )
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_line_number(true),
                )
                .with(filter)
                .init();
        }
    }

    Ok(())
}

/// Open a span carrying `tracking_id` for the duration of one message
/// handler. Every log line emitted while this span is entered inherits the
/// field, satisfying spec §4.6's "MUST appear unchanged on every derived
/// record" for log output (the field itself is copied verbatim from the
/// in-memory event, which carries the same guarantee across bus hops).
pub fn tracked_operation(operation: &'static str, tracking_id: &str) -> Span {
    tracing::info_span!("operation", operation, tracking_id = %tracking_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
