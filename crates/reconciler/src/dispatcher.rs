//! State dispatcher: one resource in, at most one side effect out.

use std::sync::Arc;

use async_trait::async_trait;
use kubedbg_api::DebugAttachment;
use tracing::debug;

use crate::controller::DebugController;
use crate::error::Result;
use crate::pool::{Launch, TaskPool};
use crate::types::{ActionKind, Dispatch, Step, plan};

/// Dispatches a single resource.
#[async_trait]
pub trait AttachmentDispatcher: Send + Sync {
    /// Run, launch or skip whatever the resource's state calls for.
    async fn dispatch(&self, attachment: &DebugAttachment) -> Result<Dispatch>;
}

/// Dispatcher backed by a [`DebugController`] and a [`TaskPool`].
///
/// | State                | Action            | Mode        |
/// |----------------------|-------------------|-------------|
/// | RequestingAttachment | attach-request    | pool task   |
/// | PendingAttachment    | none              |             |
/// | Attached             | none              |             |
/// | RequestingDelete     | remove-attachment | pool task   |
/// | PendingDelete        | delete-resource   | inline      |
pub struct StateDispatcher {
    controller: Arc<DebugController>,
    pool: TaskPool,
}

impl StateDispatcher {
    /// Create a new dispatcher.
    pub const fn new(controller: Arc<DebugController>, pool: TaskPool) -> Self {
        Self { controller, pool }
    }

    /// The controller running the side effects.
    pub const fn controller(&self) -> &Arc<DebugController> {
        &self.controller
    }

    /// The pool running background tasks.
    pub const fn pool(&self) -> &TaskPool {
        &self.pool
    }

    fn launched(action: ActionKind, launch: Launch) -> Dispatch {
        match launch {
            Launch::Started => Dispatch::Launched(action),
            Launch::AlreadyInFlight => Dispatch::InFlight(action),
        }
    }
}

#[async_trait]
impl AttachmentDispatcher for StateDispatcher {
    async fn dispatch(&self, attachment: &DebugAttachment) -> Result<Dispatch> {
        let reference = &attachment.reference;
        let step = plan(attachment)?;
        debug!(attachment = %reference, state = %attachment.state(), step = ?step, "Dispatching");

        let dispatch = match step {
            Step::Attach => {
                let controller = Arc::clone(&self.controller);
                let attachment = attachment.clone();
                let launch = self.pool.try_launch(reference.clone(), async move {
                    controller.handle_attachment_request(attachment).await;
                });
                Self::launched(ActionKind::Attach, launch)
            }
            Step::Remove => {
                let controller = Arc::clone(&self.controller);
                let target = reference.clone();
                let launch = self.pool.try_launch(reference.clone(), async move {
                    controller.handle_remove_request(target).await;
                });
                Self::launched(ActionKind::Remove, launch)
            }
            Step::Delete => {
                self.controller.delete_resource(reference).await?;
                Dispatch::Deleted
            }
            Step::Wait(state) => Dispatch::Idle(state),
        };

        if matches!(dispatch, Dispatch::InFlight(_)) {
            debug!(attachment = %reference, "Task still running, skipping");
        }
        Ok(dispatch)
    }
}
