//! Error types for the reconciler crate.

use std::fmt;

use kubedbg_api::AttachmentRef;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone)]
pub enum Error {
    /// The resource carries a state outside the known lifecycle.
    UnrecognizedState {
        reference: AttachmentRef,
        value: String,
    },
    /// No running process matched the target.
    ProcessNotFound {
        reference: AttachmentRef,
        target: String,
    },
    /// The process locator failed.
    LocatorFailed { reason: String },
    /// Starting or stopping a debugger failed.
    DebuggerFailed { kind: String, reason: String },
    /// No debugger of this kind is available.
    UnsupportedDebugger { kind: String },
    /// Store operation failed.
    Store(kubedbg_api::Error),
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedState { reference, value } => {
                write!(f, "DebugAttachment state not recognized: '{value}' on '{reference}'")
            }
            Self::ProcessNotFound { reference, target } => {
                write!(f, "no process matching {target} for '{reference}'")
            }
            Self::LocatorFailed { reason } => {
                write!(f, "process lookup failed: {reason}")
            }
            Self::DebuggerFailed { kind, reason } => {
                write!(f, "debugger '{kind}' failed: {reason}")
            }
            Self::UnsupportedDebugger { kind } => {
                write!(f, "unsupported debugger '{kind}'")
            }
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::InvalidConfig { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<kubedbg_api::Error> for Error {
    fn from(e: kubedbg_api::Error) -> Self {
        Self::Store(e)
    }
}

impl Error {
    /// Create an unrecognized state error.
    pub fn unrecognized_state(reference: &AttachmentRef, value: impl Into<String>) -> Self {
        Self::UnrecognizedState {
            reference: reference.clone(),
            value: value.into(),
        }
    }

    /// Create a process not found error.
    pub fn process_not_found(reference: &AttachmentRef, target: impl Into<String>) -> Self {
        Self::ProcessNotFound {
            reference: reference.clone(),
            target: target.into(),
        }
    }

    /// Create a locator failed error.
    pub fn locator_failed(reason: impl Into<String>) -> Self {
        Self::LocatorFailed {
            reason: reason.into(),
        }
    }

    /// Create a debugger failed error.
    pub fn debugger_failed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DebuggerFailed {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported debugger error.
    pub fn unsupported_debugger(kind: impl Into<String>) -> Self {
        Self::UnsupportedDebugger { kind: kind.into() }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check whether this wraps a store "not found".
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}
