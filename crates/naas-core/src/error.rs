//! Error types for the maritime AIOps pipeline.
//!
//! The variant set matches spec §7's error kinds exactly; each carries a
//! routing decision (dead-letter, retry, fallback, circuit-break, exit) that
//! callers read off via [`Error::is_retryable`] / [`Error::is_transient`] /
//! [`Error::is_dead_letter`] rather than re-deriving it from the variant name.

use std::fmt;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Record's `schema_version` is missing or unrecognized. Always
    /// dead-lettered, never coerced (spec §7, §8 inv. ii).
    #[error("schema error: {0}")]
    Schema(String),

    /// Bus publish/consume failed transiently. Retried with exponential
    /// backoff up to 5 attempts, then dead-lettered (spec §7).
    #[error("bus transient error: {0}")]
    BusTransient(String),

    /// A dependency call (registry, storage, LLM, vector store) exceeded its
    /// budget. Caller falls back to degraded behavior and increments a
    /// counter; never retried inline (spec §7).
    #[error("dependency timeout: {0}")]
    DependencyTimeout(String),

    /// A dependency is down entirely. Caller circuit-breaks for 30s and uses
    /// its fallback path for the duration (spec §7).
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// A data invariant was violated (spec §8's invariants i-vi). Logged,
    /// dead-lettered, and counted; never silently coerced.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Unrecoverable startup failure. The process exits with code 2.
    #[error("fatal startup error: {0}")]
    FatalStartup(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors.
    #[error("validation error: {0}")]
    Validation(String),

    /// IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Network/connection errors below the bus abstraction (HTTP clients,
    /// raw socket setup).
    #[error("connection error: {0}")]
    Connection(String),

    /// Not found errors.
    #[error("{0} not found")]
    NotFound(String),

    /// Generic errors with context.
    #[error("{context}: {source}")]
    WithContext {
        /// Error context.
        context: String,
        /// Source error.
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context<C: fmt::Display>(self, context: C) -> Self {
        Error::WithContext {
            context: context.to_string(),
            source: Box::new(self),
        }
    }

    /// Create a schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        Error::Schema(msg.into())
    }

    /// Create a bus transient error.
    pub fn bus_transient<S: Into<String>>(msg: S) -> Self {
        Error::BusTransient(msg.into())
    }

    /// Create a dependency timeout error.
    pub fn dependency_timeout<S: Into<String>>(msg: S) -> Self {
        Error::DependencyTimeout(msg.into())
    }

    /// Create a dependency unavailable error.
    pub fn dependency_unavailable<S: Into<String>>(msg: S) -> Self {
        Error::DependencyUnavailable(msg.into())
    }

    /// Create an invariant violation error.
    pub fn invariant_violation<S: Into<String>>(msg: S) -> Self {
        Error::InvariantViolation(msg.into())
    }

    /// Create a fatal startup error.
    pub fn fatal_startup<S: Into<String>>(msg: S) -> Self {
        Error::FatalStartup(msg.into())
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a connection error.
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::Connection(msg.into())
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(item: S) -> Self {
        Error::NotFound(item.into())
    }

    /// Should this error be retried with backoff before giving up?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BusTransient(_) | Error::Connection(_))
    }

    /// Is this error expected to resolve itself given time (as opposed to a
    /// permanent misconfiguration or data defect)?
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::BusTransient(_) | Error::DependencyTimeout(_) | Error::DependencyUnavailable(_)
        )
    }

    /// Should the triggering record be routed to its dead-letter subject?
    pub fn is_dead_letter(&self) -> bool {
        matches!(self, Error::Schema(_) | Error::InvariantViolation(_))
    }

    /// Should the process exit(2) rather than attempt recovery?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FatalStartup(_))
    }
}
