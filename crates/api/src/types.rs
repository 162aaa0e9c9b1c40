//! Core types for the DebugAttachment resource.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a DebugAttachment: `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// Name of the resource, unique within the namespace.
    pub name: String,
}

impl AttachmentRef {
    /// Create a new reference.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AttachmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Lifecycle of a DebugAttachment.
///
/// Attach path: `RequestingAttachment -> PendingAttachment -> Attached`.
/// Delete path: `RequestingDelete -> PendingDelete -> (removed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachmentState {
    /// Created by an operator, waiting for the controller to pick it up.
    RequestingAttachment,
    /// The controller accepted the attach work and is running it.
    PendingAttachment,
    /// A debug server is up. Steady state.
    Attached,
    /// The operator asked for the attachment to go away.
    RequestingDelete,
    /// The session is stopped, the resource document is next.
    PendingDelete,
}

impl AttachmentState {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::RequestingAttachment,
        Self::PendingAttachment,
        Self::Attached,
        Self::RequestingDelete,
        Self::PendingDelete,
    ];

    /// Wire form of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestingAttachment => "RequestingAttachment",
            Self::PendingAttachment => "PendingAttachment",
            Self::Attached => "Attached",
            Self::RequestingDelete => "RequestingDelete",
            Self::PendingDelete => "PendingDelete",
        }
    }

    /// Check whether the state belongs to the delete path.
    pub const fn is_delete_path(self) -> bool {
        matches!(self, Self::RequestingDelete | Self::PendingDelete)
    }
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// State value as observed on the wire.
///
/// Stores keep `state` as a string. Anything outside the five known values is
/// kept verbatim so the dispatcher can reject it by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WireState {
    /// One of the five known states.
    Known(AttachmentState),
    /// An unrecognized raw value.
    Unrecognized(String),
}

impl WireState {
    /// The known state, if any.
    pub const fn known(&self) -> Option<AttachmentState> {
        match self {
            Self::Known(state) => Some(*state),
            Self::Unrecognized(_) => None,
        }
    }

    /// Check whether this is exactly the given known state.
    pub fn is(&self, state: AttachmentState) -> bool {
        self.known() == Some(state)
    }
}

impl From<AttachmentState> for WireState {
    fn from(state: AttachmentState) -> Self {
        Self::Known(state)
    }
}

impl From<String> for WireState {
    fn from(raw: String) -> Self {
        raw.parse::<AttachmentState>()
            .map_or_else(Self::Unrecognized, Self::Known)
    }
}

impl From<WireState> for String {
    fn from(state: WireState) -> Self {
        match state {
            WireState::Known(state) => state.as_str().to_string(),
            WireState::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for WireState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(state) => f.write_str(state.as_str()),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

/// What the operator asked for. Written once by the creator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSpec {
    /// Image of the target container.
    pub image: String,
    /// Target pod name.
    pub pod: String,
    /// Target container name.
    pub container: String,
    /// Process name filter. Empty means "the container's main process".
    #[serde(default)]
    pub process_name: String,
    /// Debugger kind, e.g. `dlv` or `gdb`.
    pub debugger: String,
}

impl AttachmentSpec {
    /// Create a spec with no process filter.
    pub fn new(
        image: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
        debugger: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into(),
            pod: pod.into(),
            container: container.into(),
            process_name: String::new(),
            debugger: debugger.into(),
        }
    }

    /// Restrict the target to processes matching `filter`.
    #[must_use]
    pub fn with_process_filter(mut self, filter: impl Into<String>) -> Self {
        self.process_name = filter.into();
        self
    }

    /// The process filter, or `None` when unset.
    pub fn process_filter(&self) -> Option<&str> {
        Some(self.process_name.as_str()).filter(|f| !f.is_empty())
    }
}

/// Observed progress. Written only by the debug controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentStatus {
    /// Current lifecycle state.
    pub state: WireState,
    /// Address of the debug server; empty unless attached.
    #[serde(default)]
    pub debug_server_address: String,
}

impl AttachmentStatus {
    /// Status for a state that carries no address.
    pub fn new(state: AttachmentState) -> Self {
        Self {
            state: state.into(),
            debug_server_address: String::new(),
        }
    }

    /// Status of a freshly created resource.
    pub fn requesting_attachment() -> Self {
        Self::new(AttachmentState::RequestingAttachment)
    }

    /// Status of a resource with a running debug server.
    pub fn attached(address: impl Into<String>) -> Self {
        Self {
            state: AttachmentState::Attached.into(),
            debug_server_address: address.into(),
        }
    }

    /// Check that the address is set exactly when the state is `Attached`.
    pub fn is_consistent(&self) -> bool {
        self.state.is(AttachmentState::Attached) != self.debug_server_address.is_empty()
    }
}

impl Default for AttachmentStatus {
    fn default() -> Self {
        Self::requesting_attachment()
    }
}

/// Declarative intent to attach a debugger to a process in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugAttachment {
    /// Identity.
    #[serde(flatten)]
    pub reference: AttachmentRef,
    /// What the operator asked for.
    pub spec: AttachmentSpec,
    /// Observed progress.
    #[serde(default)]
    pub status: AttachmentStatus,
    /// Store version token as last observed. Opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl DebugAttachment {
    /// Create a new attachment in `RequestingAttachment`.
    pub fn new(reference: AttachmentRef, spec: AttachmentSpec) -> Self {
        Self {
            reference,
            spec,
            status: AttachmentStatus::requesting_attachment(),
            resource_version: None,
        }
    }

    /// Namespace of the resource.
    pub fn namespace(&self) -> &str {
        &self.reference.namespace
    }

    /// Name of the resource.
    pub fn name(&self) -> &str {
        &self.reference.name
    }

    /// Observed state.
    pub const fn state(&self) -> &WireState {
        &self.status.state
    }

    /// Replace the status.
    #[must_use]
    pub fn with_status(mut self, status: AttachmentStatus) -> Self {
        self.status = status;
        self
    }
}

/// Point-in-time listing of every DebugAttachment in the watched namespaces,
/// grouped by namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    attachments: BTreeMap<String, Vec<DebugAttachment>>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listing for one namespace.
    pub fn insert(&mut self, namespace: impl Into<String>, attachments: Vec<DebugAttachment>) {
        self.attachments.insert(namespace.into(), attachments);
    }

    /// Listing for one namespace.
    pub fn namespace(&self, namespace: &str) -> &[DebugAttachment] {
        self.attachments
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Namespace groups.
    pub fn by_namespace(&self) -> impl Iterator<Item = (&str, &[DebugAttachment])> {
        self.attachments
            .iter()
            .map(|(ns, list)| (ns.as_str(), list.as_slice()))
    }

    /// Every attachment, across namespaces.
    pub fn iter(&self) -> impl Iterator<Item = &DebugAttachment> {
        self.attachments.values().flatten()
    }

    /// Find one attachment.
    pub fn get(&self, reference: &AttachmentRef) -> Option<&DebugAttachment> {
        self.namespace(&reference.namespace)
            .iter()
            .find(|a| a.name() == reference.name)
    }

    /// Number of attachments across namespaces.
    pub fn len(&self) -> usize {
        self.attachments.values().map(Vec::len).sum()
    }

    /// Check if the snapshot holds no attachments.
    pub fn is_empty(&self) -> bool {
        self.attachments.values().all(Vec::is_empty)
    }
}

impl FromIterator<DebugAttachment> for Snapshot {
    fn from_iter<I: IntoIterator<Item = DebugAttachment>>(iter: I) -> Self {
        let mut attachments: BTreeMap<String, Vec<DebugAttachment>> = BTreeMap::new();
        for attachment in iter {
            attachments
                .entry(attachment.reference.namespace.clone())
                .or_default()
                .push(attachment);
        }
        Self { attachments }
    }
}
