//! Error types for trap handling operations.
//!
//! This module defines the error types used throughout the trap crates.
//! "Not found" resolutions and denied port leases are outcomes rather than
//! errors and are therefore not part of this taxonomy.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for trap operations.
pub type TrapResult<T> = Result<T, TrapError>;

/// Errors that can occur while resolving addresses or dispatching actions.
#[derive(Debug, Error)]
pub enum TrapError {
    /// A device query did not complete in time.
    #[error("Query '{oid}' against {device} timed out after {timeout:?}")]
    QueryTimeout {
        /// The queried device address.
        device: String,
        /// The queried table identifier.
        oid: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The device query executor returned a non-zero status.
    #[error("Query '{oid}' against {device} failed (exit code {exit_code}): {output}")]
    QueryFailed {
        /// The queried device address.
        device: String,
        /// The queried table identifier.
        oid: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Failed to spawn an external program.
    #[error("Failed to execute '{program}': {source}")]
    ProcessSpawn {
        /// The program that could not be started.
        program: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A single response record could not be parsed.
    #[error("Malformed record '{record}': {reason}")]
    RecordParse {
        /// The offending record.
        record: String,
        /// Why the record was rejected.
        reason: String,
    },

    /// A playbook did not complete in time.
    #[error("Playbook '{playbook}' timed out after {timeout:?}")]
    PlaybookTimeout {
        /// The playbook name.
        playbook: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A playbook exited with a non-zero status.
    #[error("Playbook '{playbook}' failed (exit code {exit_code}): {output}")]
    PlaybookFailed {
        /// The playbook name.
        playbook: String,
        /// The exit code.
        exit_code: i32,
        /// Captured diagnostic output.
        output: String,
    },

    /// The configuration document could not be loaded.
    #[error("Failed to load configuration {path}: {message}")]
    ConfigLoad {
        /// Path of the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// The trap payload was empty.
    #[error("Empty trap payload")]
    EmptyPayload,

    /// A bounded worker pool had no free slot.
    #[error("Worker pool '{pool}' saturated ({capacity} slots busy)")]
    PoolSaturated {
        /// Name of the pool.
        pool: String,
        /// Total number of slots.
        capacity: usize,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl TrapError {
    /// Creates a malformed record error.
    pub fn record_parse(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RecordParse {
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration load error.
    pub fn config_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a pool saturation error.
    pub fn pool_saturated(pool: impl Into<String>, capacity: usize) -> Self {
        Self::PoolSaturated {
            pool: pool.into(),
            capacity,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrapError::QueryTimeout { .. }
                | TrapError::QueryFailed { .. }
                | TrapError::PoolSaturated { .. }
        )
    }

    /// Returns true if this error must abort the whole invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrapError::ConfigLoad { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrapError::QueryTimeout {
            device: "2001:db8::1".to_string(),
            oid: "1.3.6.1.2.1.17.4.3.1.2".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "Query '1.3.6.1.2.1.17.4.3.1.2' against 2001:db8::1 timed out after 10s"
        );
    }

    #[test]
    fn test_config_load_error() {
        let err = TrapError::config_load("/etc/sonic/devices.json", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "Failed to load configuration /etc/sonic/devices.json: expected value at line 1"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_playbook_failed() {
        let err = TrapError::PlaybookFailed {
            playbook: "playbooks/clean_port.yml".to_string(),
            exit_code: 2,
            output: "unreachable".to_string(),
        };
        assert!(err.to_string().contains("clean_port.yml"));
        assert!(err.to_string().contains("exit code 2"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_is_retryable() {
        let timeout = TrapError::QueryTimeout {
            device: "10.0.0.1".to_string(),
            oid: "1.3.6.1".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert!(TrapError::pool_saturated("actions", 3).is_retryable());
        assert!(!TrapError::internal("bug").is_retryable());
        assert!(!TrapError::EmptyPayload.is_retryable());
        assert!(!TrapError::EmptyPayload.is_fatal());
    }
}
