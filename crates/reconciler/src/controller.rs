//! Debug controller: the side effects behind each dispatch.
//!
//! Every status write is read-check-write: the resource is re-read and only
//! moved forward if it is still in the state this action expects. The store's
//! own consistency guarantees cover the rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kubedbg_api::{
    AttachmentClient, AttachmentRef, AttachmentState, AttachmentStatus, DebugAttachment,
};
use tracing::{debug, info, warn};

use crate::capability::{DebugServer, DebuggerSession, ProcessLocator, ProcessTarget};
use crate::error::{Error, Result};
use crate::report::FailureReporter;
use crate::types::ActionKind;

/// How an attach request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The debug server is up and its address is recorded.
    Attached(String),
    /// The resource left `RequestingAttachment`/`PendingAttachment` under us.
    Superseded,
}

/// Runs attach, remove and delete against the store and the platform.
pub struct DebugController {
    store: Arc<dyn AttachmentClient>,
    locator: Arc<dyn ProcessLocator>,
    debugger: Arc<dyn DebuggerSession>,
    reporter: Arc<dyn FailureReporter>,
    sessions: Mutex<HashMap<AttachmentRef, DebugServer>>,
}

impl DebugController {
    /// Create a new controller.
    pub fn new(
        store: Arc<dyn AttachmentClient>,
        locator: Arc<dyn ProcessLocator>,
        debugger: Arc<dyn DebuggerSession>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        Self {
            store,
            locator,
            debugger,
            reporter,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The store this controller writes to.
    pub fn store(&self) -> &Arc<dyn AttachmentClient> {
        &self.store
    }

    /// Debug server currently recorded for `reference`.
    pub fn session(&self, reference: &AttachmentRef) -> Option<DebugServer> {
        self.sessions().get(reference).cloned()
    }

    /// Number of live debug servers.
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Attach task body: run [`Self::attach_request`] and report failure.
    ///
    /// Whatever the outcome, a delete requested while the task ran is carried
    /// out before the task ends. The dispatcher skipped it as in flight and no
    /// further change may arrive to trigger another pass.
    pub async fn handle_attachment_request(&self, attachment: DebugAttachment) {
        let reference = &attachment.reference;
        if let Err(e) = self.attach_request(&attachment).await {
            self.reporter.report(reference, ActionKind::Attach, &e).await;
        }
        self.finish_requested_delete(reference).await;
    }

    /// Remove task body: run [`Self::remove_attachment`] and report failure.
    pub async fn handle_remove_request(&self, reference: AttachmentRef) {
        if let Err(e) = self.remove_attachment(&reference).await {
            self.reporter.report(&reference, ActionKind::Remove, &e).await;
        }
    }

    /// Locate the target process, start a debugger and record its address.
    ///
    /// The resource is moved to `PendingAttachment` before any slow work. If
    /// no process matches, the resource never reaches `Attached`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProcessNotFound`] when nothing matches the target, or
    /// the locator, debugger or store error that stopped the attach.
    pub async fn attach_request(&self, attachment: &DebugAttachment) -> Result<AttachOutcome> {
        let reference = &attachment.reference;

        let claimed = self
            .advance(
                reference,
                AttachmentState::RequestingAttachment,
                AttachmentStatus::new(AttachmentState::PendingAttachment),
            )
            .await?;
        if !claimed {
            debug!(attachment = %reference, "Attach request already taken");
            return Ok(AttachOutcome::Superseded);
        }

        let target = ProcessTarget {
            namespace: attachment.namespace().to_string(),
            pod: attachment.spec.pod.clone(),
            container: attachment.spec.container.clone(),
            process_filter: attachment.spec.process_filter().map(str::to_string),
        };
        let pid = self
            .locator
            .resolve(&target)
            .await?
            .ok_or_else(|| Error::process_not_found(reference, target.to_string()))?;
        debug!(attachment = %reference, pid, process = %target, "Resolved target process");

        let server = self.debugger.start(pid, &attachment.spec.debugger).await?;

        match self
            .advance(
                reference,
                AttachmentState::PendingAttachment,
                AttachmentStatus::attached(server.address.clone()),
            )
            .await
        {
            Ok(true) => {
                info!(
                    attachment = %reference,
                    pid,
                    debugger = %server.kind,
                    address = %server.address,
                    "Debugger attached"
                );
                let address = server.address.clone();
                self.sessions().insert(reference.clone(), server);
                Ok(AttachOutcome::Attached(address))
            }
            Ok(false) => {
                info!(attachment = %reference, "Attachment changed while attaching, stopping debugger");
                self.stop_quietly(&server).await;
                Ok(AttachOutcome::Superseded)
            }
            Err(e) => {
                self.stop_quietly(&server).await;
                Err(e)
            }
        }
    }

    /// Stop the debug server for `reference` (if any) and move the resource
    /// to `PendingDelete`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the status write fails. A resource that is
    /// already gone is not an error.
    pub async fn remove_attachment(&self, reference: &AttachmentRef) -> Result<()> {
        let server = self.sessions().remove(reference);
        if let Some(server) = server {
            info!(attachment = %reference, address = %server.address, "Stopping debugger");
            self.stop_quietly(&server).await;
        }

        match self
            .store
            .update_status(reference, AttachmentStatus::new(AttachmentState::PendingDelete))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(attachment = %reference, "Attachment already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the resource document.
    ///
    /// # Errors
    ///
    /// Returns the store error if the delete fails. A resource that is
    /// already gone is not an error.
    pub async fn delete_resource(&self, reference: &AttachmentRef) -> Result<()> {
        let stray = self.sessions().remove(reference);
        if let Some(server) = stray {
            self.stop_quietly(&server).await;
        }

        match self.store.delete(reference).await {
            Ok(()) => {
                info!(attachment = %reference, "Attachment deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(attachment = %reference, "Attachment already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run remove-attachment if the resource is now in `RequestingDelete`.
    async fn finish_requested_delete(&self, reference: &AttachmentRef) {
        let outcome = match self.is_in(reference, AttachmentState::RequestingDelete).await {
            Ok(false) => return,
            Ok(true) => {
                info!(attachment = %reference, "Delete requested during attach, removing");
                self.remove_attachment(reference).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            self.reporter.report(reference, ActionKind::Remove, &e).await;
        }
    }

    /// Write `status` if the resource is still in `expected`.
    /// Returns false if it was missing or had moved on.
    ///
    /// The check and the write are two store calls. A change landing between
    /// them is overwritten.
    async fn advance(
        &self,
        reference: &AttachmentRef,
        expected: AttachmentState,
        status: AttachmentStatus,
    ) -> Result<bool> {
        if !self.is_in(reference, expected).await? {
            return Ok(false);
        }
        match self.store.update_status(reference, status).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_in(&self, reference: &AttachmentRef, state: AttachmentState) -> Result<bool> {
        let current = self.store.get(reference).await?;
        Ok(current.is_some_and(|a| a.state().is(state)))
    }

    async fn stop_quietly(&self, server: &DebugServer) {
        if let Err(e) = self.debugger.stop(server).await {
            warn!(address = %server.address, error = %e, "Failed to stop debugger");
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<AttachmentRef, DebugServer>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
