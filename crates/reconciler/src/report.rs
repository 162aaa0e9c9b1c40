//! Where failures of background attach/remove work go.
//!
//! Tasks launched by the dispatcher never return to the syncer, so their
//! errors are handed to a [`FailureReporter`]. The default only logs; a
//! deployment that wants failures visible on the resource plugs in its own.

use async_trait::async_trait;
use kubedbg_api::AttachmentRef;
use tracing::warn;

use crate::error::Error;
use crate::types::ActionKind;

/// Receives errors from attach and remove tasks.
#[async_trait]
pub trait FailureReporter: Send + Sync {
    /// Report that `action` on `reference` failed with `error`.
    async fn report(&self, reference: &AttachmentRef, action: ActionKind, error: &Error);
}

/// Logs failures as structured warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFailureReporter;

#[async_trait]
impl FailureReporter for LogFailureReporter {
    async fn report(&self, reference: &AttachmentRef, action: ActionKind, error: &Error) {
        warn!(
            namespace = %reference.namespace,
            name = %reference.name,
            action = %action,
            error = %error,
            "Debug attachment action failed"
        );
    }
}
