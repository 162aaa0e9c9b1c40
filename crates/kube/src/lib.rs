//! Kubernetes adapters for kubedbg.
//!
//! - [`KubeAttachmentClient`]: the attachment store over the
//!   `debug.kubedbg.io/v1` `DebugAttachment` custom resource
//! - [`ContainerProcessLocator`]: maps a pod/container/process filter to a
//!   host pid through the pod's container status and the node's procfs
//! - [`connect`] and [`discover_namespaces`]: bootstrap helpers
//!
//! # Example
//!
//! ```ignore
//! use kubedbg_kube::{CredentialMode, KubeAttachmentClient, connect, discover_namespaces};
//!
//! let client = connect(CredentialMode::InCluster).await?;
//! let namespaces = discover_namespaces(client.clone()).await?;
//! let store = KubeAttachmentClient::new(client);
//! ```

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod client;
pub mod cluster;
pub mod crd;
pub mod error;
pub mod locator;

pub use client::{FIELD_MANAGER, KubeAttachmentClient};
pub use cluster::{CredentialMode, connect, discover_namespaces, namespace_names};
pub use crd::{DebugAttachmentResource, DebugAttachmentSpec, DebugAttachmentStatus, crd_json};
pub use error::{Error, Result};
pub use locator::{
    ContainerProcessLocator, ProcessEntry, container_id_of, parse_container_id, scan_container,
    select_process,
};
