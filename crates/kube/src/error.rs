//! Error types for the Kubernetes adapters.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Kubernetes adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kubernetes adapter errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The API server rejected or failed a request.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Cluster credentials could not be loaded.
    #[error("failed to load cluster credentials: {reason}")]
    Credentials { reason: String },

    /// A resource came back without a field every object must carry.
    #[error("resource is missing {field}")]
    MissingField { field: &'static str },

    /// Reading the process table failed.
    #[error("failed to read {}: {source}", path.display())]
    ProcessTable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a credentials error.
    pub fn credentials(reason: impl Into<String>) -> Self {
        Self::Credentials {
            reason: reason.into(),
        }
    }

    /// Create a missing field error.
    pub const fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Create a process table error.
    pub fn process_table(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ProcessTable {
            path: path.into(),
            source,
        }
    }

    /// HTTP status code of an API server error response.
    pub fn api_code(&self) -> Option<u16> {
        match self {
            Self::Kube(kube::Error::Api(response)) => Some(response.code),
            _ => None,
        }
    }
}

impl From<Error> for kubedbg_reconciler::Error {
    fn from(e: Error) -> Self {
        Self::locator_failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = Error::missing_field("metadata.namespace");
        assert_eq!(err.to_string(), "resource is missing metadata.namespace");
        assert_eq!(err.api_code(), None);
    }

    #[test]
    fn test_process_table_error_names_path() {
        let err = Error::process_table(
            "/host/proc",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/host/proc"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_converts_to_locator_failure() {
        let err: kubedbg_reconciler::Error = Error::credentials("no token").into();
        assert!(matches!(err, kubedbg_reconciler::Error::LocatorFailed { .. }));
    }
}
