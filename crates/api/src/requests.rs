//! Operator-side helpers: request an attachment, request its removal, wait
//! for a condition.
//!
//! These only write the creator-owned transitions (`RequestingAttachment`,
//! `RequestingDelete`); everything else is left to the debug controller.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::store::AttachmentClient;
use crate::types::{AttachmentRef, AttachmentSpec, AttachmentState, AttachmentStatus, DebugAttachment};

/// How often [`wait_for`] re-reads the resource.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Create a DebugAttachment in `RequestingAttachment`.
///
/// # Errors
///
/// Returns [`Error::AlreadyExists`] if the name is taken.
pub async fn request_attach(
    client: &dyn AttachmentClient,
    namespace: &str,
    name: &str,
    spec: AttachmentSpec,
) -> Result<DebugAttachment> {
    client
        .create(DebugAttachment::new(AttachmentRef::new(namespace, name), spec))
        .await
}

/// Move a DebugAttachment onto the delete path.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the resource does not exist.
pub async fn request_delete(
    client: &dyn AttachmentClient,
    namespace: &str,
    name: &str,
) -> Result<DebugAttachment> {
    client
        .update_status(
            &AttachmentRef::new(namespace, name),
            AttachmentStatus::new(AttachmentState::RequestingDelete),
        )
        .await
}

/// Poll a resource until `condition` holds for its current value.
///
/// `None` is passed when the resource does not exist, so callers can wait for
/// deletion too.
///
/// # Errors
///
/// Returns [`Error::Timeout`] if the condition never held within `timeout`.
pub async fn wait_for<F>(
    client: &dyn AttachmentClient,
    reference: &AttachmentRef,
    timeout: Duration,
    mut condition: F,
) -> Result<Option<DebugAttachment>>
where
    F: FnMut(Option<&DebugAttachment>) -> bool + Send,
{
    let started = Instant::now();
    loop {
        let current = client.get(reference).await?;
        if condition(current.as_ref()) {
            return Ok(current);
        }
        if started.elapsed() >= timeout {
            return Err(Error::Timeout {
                reference: reference.clone(),
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    }
}
