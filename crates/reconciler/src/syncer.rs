//! Reconciliation syncer: the entry point the event loop calls per snapshot.

use async_trait::async_trait;
use kubedbg_api::Snapshot;
use tracing::{Span, debug};

use crate::dispatcher::{AttachmentDispatcher, StateDispatcher};
use crate::error::{Error, Result};
use crate::types::PassSummary;

/// Dispatches every resource of a snapshot.
///
/// Holds nothing between passes: each pass derives its work from the
/// snapshot alone.
pub struct ReconciliationSyncer<D: AttachmentDispatcher = StateDispatcher> {
    dispatcher: D,
    span: Span,
}

impl<D: AttachmentDispatcher> ReconciliationSyncer<D> {
    /// Create a syncer over `dispatcher`.
    pub const fn new(dispatcher: D, span: Span) -> Self {
        Self { dispatcher, span }
    }

    /// The dispatcher.
    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Dispatch every resource in `snapshot`, namespace by namespace.
    ///
    /// # Errors
    ///
    /// Stops at the first dispatch error and returns it; resources after it
    /// are left for the next pass.
    pub async fn sync_pass(&self, snapshot: &Snapshot) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        for (namespace, attachments) in snapshot.by_namespace() {
            debug!(parent: &self.span, namespace, count = attachments.len(), "Syncing namespace");
            for attachment in attachments {
                summary.record(self.dispatcher.dispatch(attachment).await?);
            }
        }
        Ok(summary)
    }
}

#[async_trait]
impl<D: AttachmentDispatcher> kubedbg_api::Syncer for ReconciliationSyncer<D> {
    type Error = Error;

    async fn sync(&self, snapshot: &Snapshot) -> Result<()> {
        let summary = self.sync_pass(snapshot).await?;
        if !summary.is_quiet() {
            debug!(
                parent: &self.span,
                dispatched = summary.dispatched,
                launched = summary.launched,
                in_flight = summary.in_flight,
                deleted = summary.deleted,
                idle = summary.idle,
                "Sync complete"
            );
        }
        Ok(())
    }
}
