//! The DebugAttachment custom resource.
//!
//! `debug.kubedbg.io/v1`, namespaced, with a status subresource. The status
//! keeps its state as a plain string so values this agent does not know still
//! round-trip and reach the reconciler as unrecognized.

use kube::{CustomResource, CustomResourceExt};
use kubedbg_api::{AttachmentRef, AttachmentSpec, AttachmentStatus, DebugAttachment, WireState};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Spec of a DebugAttachment as stored in the cluster.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "debug.kubedbg.io",
    version = "v1",
    kind = "DebugAttachment",
    root = "DebugAttachmentResource",
    namespaced,
    status = "DebugAttachmentStatus",
    shortname = "dbgattach",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".status.debugServerAddress"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DebugAttachmentSpec {
    /// Image of the target container.
    pub image: String,
    /// Target pod name.
    pub pod: String,
    /// Target container name.
    pub container: String,
    /// Process name filter; empty selects the container's main process.
    #[serde(default)]
    pub process_name: String,
    /// Debugger kind.
    pub debugger: String,
}

/// Status subresource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebugAttachmentStatus {
    /// Lifecycle state.
    #[serde(default)]
    pub state: String,
    /// Debug server address; set only when attached.
    #[serde(default)]
    pub debug_server_address: String,
}

impl From<AttachmentSpec> for DebugAttachmentSpec {
    fn from(spec: AttachmentSpec) -> Self {
        Self {
            image: spec.image,
            pod: spec.pod,
            container: spec.container,
            process_name: spec.process_name,
            debugger: spec.debugger,
        }
    }
}

impl From<DebugAttachmentSpec> for AttachmentSpec {
    fn from(spec: DebugAttachmentSpec) -> Self {
        Self {
            image: spec.image,
            pod: spec.pod,
            container: spec.container,
            process_name: spec.process_name,
            debugger: spec.debugger,
        }
    }
}

impl From<AttachmentStatus> for DebugAttachmentStatus {
    fn from(status: AttachmentStatus) -> Self {
        Self {
            state: status.state.to_string(),
            debug_server_address: status.debug_server_address,
        }
    }
}

impl From<DebugAttachmentStatus> for AttachmentStatus {
    fn from(status: DebugAttachmentStatus) -> Self {
        // A status written without a state has not been picked up yet.
        if status.state.is_empty() {
            return Self::requesting_attachment();
        }
        Self {
            state: WireState::from(status.state),
            debug_server_address: status.debug_server_address,
        }
    }
}

impl TryFrom<DebugAttachmentResource> for DebugAttachment {
    type Error = Error;

    fn try_from(resource: DebugAttachmentResource) -> Result<Self> {
        let namespace = resource
            .metadata
            .namespace
            .ok_or_else(|| Error::missing_field("metadata.namespace"))?;
        let name = resource
            .metadata
            .name
            .ok_or_else(|| Error::missing_field("metadata.name"))?;

        let mut attachment = Self::new(AttachmentRef::new(namespace, name), resource.spec.into());
        attachment.status = resource.status.map(Into::into).unwrap_or_default();
        attachment.resource_version = resource.metadata.resource_version;
        Ok(attachment)
    }
}

impl From<&DebugAttachment> for DebugAttachmentResource {
    fn from(attachment: &DebugAttachment) -> Self {
        let mut resource = Self::new(attachment.name(), attachment.spec.clone().into());
        resource.metadata.namespace = Some(attachment.namespace().to_string());
        resource.metadata.resource_version.clone_from(&attachment.resource_version);
        resource.status = Some(attachment.status.clone().into());
        resource
    }
}

/// The CustomResourceDefinition to install in the cluster, as JSON.
///
/// # Errors
///
/// Returns the serializer error if the definition cannot be encoded.
pub fn crd_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&DebugAttachmentResource::crd())
}
