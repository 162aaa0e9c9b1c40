//! DebugAttachment resources and how they are observed.
//!
//! This crate holds everything the reconciler needs to see the world:
//!
//! - **Types**: the `DebugAttachment` resource, its five-state lifecycle and
//!   namespace-grouped snapshots
//! - **Store**: the client contract for reading, updating and deleting
//!   attachments, with an in-memory implementation and a tracing wrapper
//! - **Event loop**: turns store change notifications into serialized
//!   reconciliation passes over full snapshots
//! - **Requests**: operator-side helpers to request attach/delete and wait
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kubedbg_api::{EventLoop, InMemoryAttachmentStore, LoopConfig, request_attach, AttachmentSpec};
//!
//! #[tokio::main]
//! async fn main() -> kubedbg_api::Result<()> {
//!     let store = InMemoryAttachmentStore::new_arc();
//!     let running = EventLoop::new(store.clone(), Arc::new(my_syncer()), LoopConfig::default())
//!         .run(vec!["dev".to_string()])
//!         .await?;
//!
//!     let spec = AttachmentSpec::new("svc:v1", "pod-a", "c0", "dlv");
//!     request_attach(store.as_ref(), "dev", "dbg-1", spec).await?;
//!     Ok(())
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod event_loop;
pub mod requests;
pub mod store;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use event_loop::{EventLoop, LoopConfig, LoopStopper, RunningLoop, Syncer};
pub use requests::{request_attach, request_delete, wait_for};
pub use store::{AttachmentClient, ChangeStream, InMemoryAttachmentStore, TracingAttachmentStore};
pub use types::{
    AttachmentRef, AttachmentSpec, AttachmentState, AttachmentStatus, DebugAttachment, Snapshot,
    WireState,
};
