//! Error types for telemetry processing.
//!
//! All fallible operations in pitcrew return [`PitcrewError`]. Most of them are
//! raised by the [`Repository`](crate::repository::Repository) boundary and are
//! caught by the [`SessionRegistry`](crate::registry::SessionRegistry), which
//! logs them and keeps processing ticks. Malformed topics and missing telemetry
//! channels are filtering conditions, not errors, and never reach callers of
//! `notify`.
//!
//! ## Error Categories
//!
//! - **Topic Errors**: topic keys that do not split into seven fields
//! - **Repository Errors**: persistence failures from the keyed repository
//! - **Lookup Errors**: records referenced by id that do not exist
//! - **Configuration Errors**: invalid or unreadable configuration
//! - **Tick Log Errors**: malformed lines in recorded tick logs
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use pitcrew::PitcrewError;
//!
//! let error = PitcrewError::repository("save lap", "connection reset");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pitcrew operations.
pub type Result<T, E = PitcrewError> = std::result::Result<T, E>;

/// Main error type for pitcrew operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PitcrewError {
    #[error("Malformed topic '{topic}': expected {expected} fields, found {found}")]
    Topic { topic: String, expected: usize, found: usize },

    #[error("Repository operation '{operation}' failed: {reason}")]
    Repository {
        operation: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Tick log error at line {line}: {details}")]
    TickLog { line: usize, details: String },

    #[error("Worker {shard} is no longer accepting ticks")]
    WorkerClosed { shard: usize },

    #[error("I/O error: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PitcrewError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Repository failures are retried naturally: session state stays in
    /// memory and the next tick or flush repeats the write.
    pub fn is_retryable(&self) -> bool {
        match self {
            PitcrewError::Repository { .. } => true,
            PitcrewError::Io { .. } => true,
            PitcrewError::Topic { .. } => false,
            PitcrewError::NotFound { .. } => false,
            PitcrewError::Config { .. } => false,
            PitcrewError::TickLog { .. } => false,
            PitcrewError::WorkerClosed { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PitcrewError::Topic { .. } => vec![
                "Publish telemetry on prefix/driver/session/game/track/car/type topics",
                "Check that no topic field contains a slash",
            ],
            PitcrewError::Repository { .. } => vec![
                "Check that the persistence backend is reachable",
                "Wait for the next flush, state is kept in memory",
            ],
            PitcrewError::NotFound { .. } => vec![
                "Verify the record was created through the repository",
                "Check that reference data (games, tracks, landmarks) is seeded",
            ],
            PitcrewError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare values against the documented defaults",
            ],
            PitcrewError::TickLog { .. } => vec![
                "Check that every line is a JSON object with topic, time and telemetry",
                "Re-record the tick log",
            ],
            PitcrewError::WorkerClosed { .. } => vec![
                "Stop dispatching ticks after shutdown",
                "Check worker logs for a panic",
            ],
            PitcrewError::Io { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
        }
    }

    /// Helper constructor for malformed topics.
    pub fn malformed_topic(topic: impl Into<String>, found: usize) -> Self {
        PitcrewError::Topic { topic: topic.into(), expected: crate::types::TOPIC_FIELDS, found }
    }

    /// Helper constructor for repository failures.
    pub fn repository(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PitcrewError::Repository { operation: operation.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for repository failures with source.
    pub fn repository_with_source(
        operation: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        PitcrewError::Repository {
            operation: operation.into(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Helper constructor for missing records.
    pub fn not_found(entity: impl Into<String>, key: impl ToString) -> Self {
        PitcrewError::NotFound { entity: entity.into(), key: key.to_string() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        PitcrewError::Config { reason: reason.into(), source: None }
    }

    /// Helper constructor for tick log errors.
    pub fn tick_log(line: usize, details: impl Into<String>) -> Self {
        PitcrewError::TickLog { line, details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn io_error(path: PathBuf, source: std::io::Error) -> Self {
        PitcrewError::Io { path, source }
    }
}

impl From<std::io::Error> for PitcrewError {
    fn from(err: std::io::Error) -> Self {
        PitcrewError::Io { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<anyhow::Error> for PitcrewError {
    fn from(err: anyhow::Error) -> Self {
        PitcrewError::Config { reason: format!("{:#}", err), source: Some(err.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_carry_their_context(
                topic in "[a-z/]{0,40}",
                found in 0usize..20,
                operation in "[a-z ]{1,20}",
                reason in ".*",
                line in 1usize..100_000
            ) {
                let topic_msg = PitcrewError::malformed_topic(topic.clone(), found).to_string();
                prop_assert!(topic_msg.contains(&topic));
                prop_assert!(topic_msg.contains(&found.to_string()));

                let repo_msg = PitcrewError::repository(operation.clone(), reason.clone()).to_string();
                prop_assert!(repo_msg.contains(&operation));
                prop_assert!(repo_msg.contains(&reason));

                let log_msg = PitcrewError::tick_log(line, "bad json").to_string();
                prop_assert!(log_msg.contains(&line.to_string()));
            }

            #[test]
            fn repository_source_chain_is_preserved(base_message in "[a-zA-Z ]{1,30}") {
                let source: Box<dyn std::error::Error + Send + Sync> =
                    Box::new(std::io::Error::other(base_message.clone()));
                let error = PitcrewError::repository_with_source("save segment", source);

                let inner = std::error::Error::source(&error);
                prop_assert!(inner.is_some());
                prop_assert!(inner.map(|e| e.to_string()).unwrap_or_default().contains(&base_message));
            }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<PitcrewError>();

        let error = PitcrewError::config("sample rate must be positive");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification() {
        assert!(PitcrewError::repository("save lap", "timeout").is_retryable());
        assert!(!PitcrewError::malformed_topic("a/b", 2).is_retryable());
        assert!(!PitcrewError::not_found("Track", 7).is_retryable());

        for error in [
            PitcrewError::repository("save lap", "timeout"),
            PitcrewError::malformed_topic("a/b", 2),
            PitcrewError::config("bad"),
        ] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn io_conversion_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "ticks.jsonl");
        let converted: PitcrewError = io_err.into();
        match converted {
            PitcrewError::Io { source, .. } => assert_eq!(source.to_string(), "ticks.jsonl"),
            other => panic!("Expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn anyhow_conversion_keeps_context_chain() {
        let err = anyhow::anyhow!("missing field").context("reading pitcrew.yaml");
        let converted: PitcrewError = err.into();
        let message = converted.to_string();
        assert!(message.contains("reading pitcrew.yaml"));
        assert!(message.contains("missing field"));
    }
}
