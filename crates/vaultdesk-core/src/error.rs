//! Error types for the Vaultdesk core.
//!
//! Only conditions that a caller can act on are errors here. Losing the
//! instance race is the `Secondary` outcome of arbitration, and an argument
//! that resolves to nothing is simply `None`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Vaultdesk core.
#[derive(Debug, Error)]
pub enum VaultdeskError {
    // Arbitration errors
    #[error("Instance arbitration unavailable at {path:?}: {message}")]
    ArbitrationUnavailable {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Channel errors
    #[error("Primary instance unreachable: {reason}")]
    ChannelUnreachable { reason: String },

    /// The request was written to a primary that never acknowledged it.
    /// Resending could deliver the arguments twice.
    #[error("Primary instance did not confirm delivery: {reason}")]
    DeliveryUnconfirmed { reason: String },

    // Shutdown errors
    #[error("Shutdown task '{task}' failed: {message}")]
    ShutdownTaskFault { task: String, message: String },

    #[error("Shutdown already started; no further tasks accepted")]
    ShutdownStarted,

    #[error("Failed to install termination handler: {0}")]
    Signal(String),

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Vaultdesk operations.
pub type Result<T> = std::result::Result<T, VaultdeskError>;

impl From<std::io::Error> for VaultdeskError {
    fn from(err: std::io::Error) -> Self {
        VaultdeskError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for VaultdeskError {
    fn from(err: serde_json::Error) -> Self {
        VaultdeskError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<ctrlc::Error> for VaultdeskError {
    fn from(err: ctrlc::Error) -> Self {
        VaultdeskError::Signal(err.to_string())
    }
}

impl VaultdeskError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        VaultdeskError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a `ChannelUnreachable` error.
    pub fn unreachable(reason: impl Into<String>) -> Self {
        VaultdeskError::ChannelUnreachable {
            reason: reason.into(),
        }
    }

    /// Shorthand for a `DeliveryUnconfirmed` error.
    pub fn unconfirmed(reason: impl Into<String>) -> Self {
        VaultdeskError::DeliveryUnconfirmed {
            reason: reason.into(),
        }
    }

    /// Whether a fresh arbitration round may recover from this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VaultdeskError::ChannelUnreachable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultdeskError::unreachable("connection refused");
        assert_eq!(
            err.to_string(),
            "Primary instance unreachable: connection refused"
        );

        let err = VaultdeskError::ShutdownTaskFault {
            task: "close-listener".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Shutdown task 'close-listener' failed: boom");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(VaultdeskError::unreachable("gone").is_recoverable());
        assert!(!VaultdeskError::unconfirmed("no answer").is_recoverable());
        assert!(!VaultdeskError::ShutdownStarted.is_recoverable());
        assert!(!VaultdeskError::Other("x".into()).is_recoverable());
    }

    #[test]
    fn test_io_with_path_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        match VaultdeskError::io_with_path(io, "/tmp/x") {
            VaultdeskError::Io { path, .. } => assert_eq!(path, Some(PathBuf::from("/tmp/x"))),
            other => panic!("Expected Io, got: {:?}", other),
        }
    }
}
