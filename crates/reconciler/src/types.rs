//! Core types for the reconciler.

use std::fmt;

use kubedbg_api::{AttachmentState, DebugAttachment};

use crate::error::{Error, Result};

/// Side effects the debug controller can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Locate the process, start a debugger, record the address.
    Attach,
    /// Stop the debugger and move the resource to `PendingDelete`.
    Remove,
    /// Delete the resource document.
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attach => f.write_str("attach"),
            Self::Remove => f.write_str("remove"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// What a resource's state calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Launch an attach task.
    Attach,
    /// Launch a remove task.
    Remove,
    /// Delete the resource inline.
    Delete,
    /// Nothing to do: steady state, or a task already owns the resource.
    Wait(AttachmentState),
}

/// Map a resource's declared state to the next step.
///
/// # Errors
///
/// Returns [`Error::UnrecognizedState`] if the state is not one of the five
/// lifecycle values.
pub fn plan(attachment: &DebugAttachment) -> Result<Step> {
    let Some(state) = attachment.state().known() else {
        return Err(Error::unrecognized_state(
            &attachment.reference,
            attachment.state().to_string(),
        ));
    };

    Ok(match state {
        AttachmentState::RequestingAttachment => Step::Attach,
        // The attach task moves the resource out of this state when it ends.
        AttachmentState::PendingAttachment => Step::Wait(state),
        AttachmentState::Attached => Step::Wait(state),
        AttachmentState::RequestingDelete => Step::Remove,
        AttachmentState::PendingDelete => Step::Delete,
    })
}

/// Outcome of dispatching one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A task was launched.
    Launched(ActionKind),
    /// A task for this resource is still running; nothing launched.
    InFlight(ActionKind),
    /// The resource was deleted inline.
    Deleted,
    /// Nothing to do in this state.
    Idle(AttachmentState),
}

/// Counts for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Resources dispatched.
    pub dispatched: usize,
    /// Tasks launched.
    pub launched: usize,
    /// Resources skipped because a task already owned them.
    pub in_flight: usize,
    /// Resources deleted inline.
    pub deleted: usize,
    /// Resources with nothing to do.
    pub idle: usize,
}

impl PassSummary {
    /// Record one dispatch outcome.
    pub fn record(&mut self, dispatch: Dispatch) {
        self.dispatched = self.dispatched.saturating_add(1);
        let counter = match dispatch {
            Dispatch::Launched(_) => &mut self.launched,
            Dispatch::InFlight(_) => &mut self.in_flight,
            Dispatch::Deleted => &mut self.deleted,
            Dispatch::Idle(_) => &mut self.idle,
        };
        *counter = counter.saturating_add(1);
    }

    /// Check whether the pass changed nothing.
    pub const fn is_quiet(&self) -> bool {
        self.launched == 0 && self.deleted == 0
    }
}
