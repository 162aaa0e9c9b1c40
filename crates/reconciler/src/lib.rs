//! Level-triggered reconciliation of DebugAttachment resources.
//!
//! Every pass reads a [`kubedbg_api::Snapshot`] and acts on each resource's
//! declared state alone:
//!
//! - `RequestingAttachment`: launch an attach task
//! - `RequestingDelete`: launch a remove task
//! - `PendingDelete`: delete the resource inline
//! - anything else known: nothing
//! - anything unknown: fail the pass
//!
//! # Key Concepts
//!
//! ## Tasks
//!
//! Attach and remove work runs on a [`TaskPool`] so a slow debugger never
//! holds up the pass. The pool runs at most one task per resource; a pass that
//! finds a task still running skips the resource.
//!
//! ## Status writes
//!
//! Tasks re-read the resource before every status write and only move it
//! forward from the state they expect. Failures go to a [`FailureReporter`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use kubedbg_api::{EventLoop, InMemoryAttachmentStore, LoopConfig};
//! use kubedbg_reconciler::ReconcilerBuilder;
//!
//! let store = InMemoryAttachmentStore::new_arc();
//! let syncer = ReconcilerBuilder::new()
//!     .with_store(store.clone())
//!     .with_locator(locator)
//!     .with_debugger(debugger)
//!     .build()?;
//!
//! let running = EventLoop::new(store, Arc::new(syncer), LoopConfig::default())
//!     .run(vec!["dev".to_string()])
//!     .await?;
//! ```

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod capability;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod reconciler;
pub mod report;
pub mod syncer;
pub mod types;

// Re-export main types
pub use capability::{DebugServer, DebuggerSession, ProcessId, ProcessLocator, ProcessTarget};
pub use controller::{AttachOutcome, DebugController};
pub use dispatcher::{AttachmentDispatcher, StateDispatcher};
pub use error::{Error, Result};
pub use pool::{Launch, TaskPool};
pub use reconciler::{ReconcilerBuilder, ReconcilerConfig};
pub use report::{FailureReporter, LogFailureReporter};
pub use syncer::ReconciliationSyncer;
pub use types::{ActionKind, Dispatch, PassSummary, Step, plan};
