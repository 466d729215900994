// Error types for certwatch
//
// Typed errors for the three fallible layers: reading a certificate source,
// dispatching a webhook notification, and persisting tracker state. A failure
// in any of them is local to one certificate's cycle iteration and never
// aborts the monitoring loop.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reading a certificate from its configured source
#[derive(Debug, Error)]
pub enum ReadError {
    /// Certificate file does not exist
    #[error("certificate file not found: {path}")]
    NotFound { path: PathBuf },

    /// Data was retrieved but is not a parseable X.509 certificate
    #[error("failed to parse certificate: {details}")]
    ParseFailure { details: String },

    /// Remote endpoint could not be connected to or handshaked with
    #[error("{endpoint} unreachable: {details}")]
    Unreachable { endpoint: String, details: String },
}

/// Errors delivering a notification to the webhook endpoint
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Connection-level failure or per-attempt timeout; retried with backoff
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// HTTP 5xx from the webhook endpoint; retried with backoff
    #[error("webhook returned server error (status {status})")]
    ServerError { status: u16 },

    /// HTTP 4xx from the webhook endpoint. Treated as a configuration
    /// problem and surfaced immediately without retrying.
    #[error("webhook rejected request (status {status}): {details}")]
    ClientConfigError { status: u16, details: String },
}

impl DispatchError {
    /// Whether a further delivery attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DispatchError::ClientConfigError { .. })
    }
}

/// Errors loading or saving the notification state file
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// State file exists but cannot be deserialized. Non-fatal: the tracker
    /// proceeds empty, at worst causing one redundant notification.
    #[error("state file {path} is corrupt: {details}")]
    Corrupt { path: PathBuf, details: String },

    /// State file cannot be written. Logged loudly but the loop continues.
    #[error("state file {path} is unwritable: {source}")]
    Unwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_display() {
        let err = ReadError::NotFound {
            path: PathBuf::from("/etc/ssl/missing.pem"),
        };
        assert!(err.to_string().contains("/etc/ssl/missing.pem"));

        let err = ReadError::Unreachable {
            endpoint: "example.com:443".to_string(),
            details: "connect timed out".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("example.com:443"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_dispatch_error_retryable() {
        assert!(DispatchError::NetworkFailure("refused".to_string()).is_retryable());
        assert!(DispatchError::ServerError { status: 503 }.is_retryable());
        assert!(!DispatchError::ClientConfigError {
            status: 404,
            details: "not found".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_persistence_error_source_preserved() {
        use std::error::Error;

        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "read-only filesystem");
        let err = PersistenceError::Unwritable {
            path: PathBuf::from("/var/lib/certwatch/state.json"),
            source: io_err,
        };

        assert!(err.source().is_some());
        assert!(err.to_string().contains("unwritable"));
    }
}
