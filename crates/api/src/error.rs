//! Error types for the api crate.

use thiserror::Error;

use crate::types::AttachmentRef;

/// Result type alias for store and event loop operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store, watch and event loop errors.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Resource does not exist.
    #[error("debug attachment '{reference}' not found")]
    NotFound { reference: AttachmentRef },

    /// Resource already exists.
    #[error("debug attachment '{reference}' already exists")]
    AlreadyExists { reference: AttachmentRef },

    /// A write would break a resource invariant.
    #[error("invalid status for '{reference}': {reason}")]
    InvalidStatus {
        reference: AttachmentRef,
        reason: String,
    },

    /// Store operation failed.
    #[error("store operation '{operation}' failed: {reason}")]
    StoreFailed { operation: String, reason: String },

    /// The watch stream reported an error.
    #[error("watch error: {reason}")]
    WatchFailed { reason: String },

    /// A reconciliation pass failed.
    #[error("sync failed: {reason}")]
    SyncFailed { reason: String },

    /// Waited too long for a resource condition.
    #[error("timed out after {waited_ms}ms waiting for '{reference}'")]
    Timeout {
        reference: AttachmentRef,
        waited_ms: u64,
    },

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a not found error.
    pub fn not_found(reference: &AttachmentRef) -> Self {
        Self::NotFound {
            reference: reference.clone(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(reference: &AttachmentRef) -> Self {
        Self::AlreadyExists {
            reference: reference.clone(),
        }
    }

    /// Create an invalid status error.
    pub fn invalid_status(reference: &AttachmentRef, reason: impl Into<String>) -> Self {
        Self::InvalidStatus {
            reference: reference.clone(),
            reason: reason.into(),
        }
    }

    /// Create a store failed error.
    pub fn store_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a watch error.
    pub fn watch_failed(reason: impl Into<String>) -> Self {
        Self::WatchFailed {
            reason: reason.into(),
        }
    }

    /// Create a sync failed error.
    pub fn sync_failed(reason: impl Into<String>) -> Self {
        Self::SyncFailed {
            reason: reason.into(),
        }
    }

    /// Check whether this is a not found error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
