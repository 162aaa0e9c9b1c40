//! Attachment store client trait and implementations.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::{RwLock, broadcast};
use tokio::sync::broadcast::error::RecvError;

use crate::error::{Error, Result};
use crate::types::{AttachmentRef, AttachmentStatus, DebugAttachment, Snapshot};

/// Stream of change notifications.
///
/// Each `Ok(())` means "something in the watched namespaces changed, list
/// again". Errors are delivery problems; the stream keeps going after them.
pub type ChangeStream = BoxStream<'static, Result<()>>;

/// Read and write access to DebugAttachment resources.
#[async_trait]
pub trait AttachmentClient: Send + Sync {
    /// List every attachment in a namespace.
    async fn list(&self, namespace: &str) -> Result<Vec<DebugAttachment>>;

    /// Read one attachment. `Ok(None)` when it does not exist.
    async fn get(&self, reference: &AttachmentRef) -> Result<Option<DebugAttachment>>;

    /// Create an attachment.
    async fn create(&self, attachment: DebugAttachment) -> Result<DebugAttachment>;

    /// Replace the status of an attachment.
    async fn update_status(
        &self,
        reference: &AttachmentRef,
        status: AttachmentStatus,
    ) -> Result<DebugAttachment>;

    /// Delete an attachment. Fails with [`Error::NotFound`] if it is gone.
    async fn delete(&self, reference: &AttachmentRef) -> Result<()>;

    /// Watch the given namespaces for changes.
    async fn watch(&self, namespaces: &[String]) -> Result<ChangeStream>;

    /// List every watched namespace into one snapshot.
    async fn snapshot(&self, namespaces: &[String]) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for namespace in namespaces {
            let attachments = self.list(namespace).await?;
            snapshot.insert(namespace.clone(), attachments);
        }
        Ok(snapshot)
    }
}

/// In-memory attachment store.
///
/// Bumps a version counter on every write and broadcasts the namespace that
/// changed to watchers.
pub struct InMemoryAttachmentStore {
    attachments: RwLock<BTreeMap<AttachmentRef, DebugAttachment>>,
    changes: broadcast::Sender<String>,
    version: AtomicU64,
}

impl InMemoryAttachmentStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            attachments: RwLock::new(BTreeMap::new()),
            changes,
            version: AtomicU64::new(0),
        }
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of attachments across all namespaces.
    pub async fn len(&self) -> usize {
        self.attachments.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.attachments.read().await.is_empty()
    }

    fn next_version(&self) -> String {
        self.version
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
            .to_string()
    }

    fn notify(&self, namespace: &str) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(namespace.to_string());
    }
}

impl Default for InMemoryAttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttachmentClient for InMemoryAttachmentStore {
    async fn list(&self, namespace: &str) -> Result<Vec<DebugAttachment>> {
        let attachments = self.attachments.read().await;
        Ok(attachments
            .values()
            .filter(|a| a.namespace() == namespace)
            .cloned()
            .collect())
    }

    async fn get(&self, reference: &AttachmentRef) -> Result<Option<DebugAttachment>> {
        Ok(self.attachments.read().await.get(reference).cloned())
    }

    async fn create(&self, mut attachment: DebugAttachment) -> Result<DebugAttachment> {
        if !attachment.status.is_consistent() {
            return Err(Error::invalid_status(
                &attachment.reference,
                "debugServerAddress must be set exactly when attached",
            ));
        }

        let mut attachments = self.attachments.write().await;
        if attachments.contains_key(&attachment.reference) {
            return Err(Error::already_exists(&attachment.reference));
        }
        attachment.resource_version = Some(self.next_version());
        attachments.insert(attachment.reference.clone(), attachment.clone());
        drop(attachments);

        self.notify(attachment.namespace());
        Ok(attachment)
    }

    async fn update_status(
        &self,
        reference: &AttachmentRef,
        status: AttachmentStatus,
    ) -> Result<DebugAttachment> {
        if !status.is_consistent() {
            return Err(Error::invalid_status(
                reference,
                "debugServerAddress must be set exactly when attached",
            ));
        }

        let mut attachments = self.attachments.write().await;
        let attachment = attachments
            .get_mut(reference)
            .ok_or_else(|| Error::not_found(reference))?;
        attachment.status = status;
        attachment.resource_version = Some(self.next_version());
        let updated = attachment.clone();
        drop(attachments);

        self.notify(&reference.namespace);
        Ok(updated)
    }

    async fn delete(&self, reference: &AttachmentRef) -> Result<()> {
        let removed = self.attachments.write().await.remove(reference);
        match removed {
            Some(_) => {
                self.notify(&reference.namespace);
                Ok(())
            }
            None => Err(Error::not_found(reference)),
        }
    }

    async fn watch(&self, namespaces: &[String]) -> Result<ChangeStream> {
        let watched: HashSet<String> = namespaces.iter().cloned().collect();
        let receiver = self.changes.subscribe();

        let changes = stream::unfold(receiver, move |mut receiver| {
            let watched = watched.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(namespace) if watched.contains(&namespace) => {
                            return Some((Ok(()), receiver));
                        }
                        Ok(_) => {}
                        // Missed some notifications; one relist covers all of them.
                        Err(RecvError::Lagged(_)) => return Some((Ok(()), receiver)),
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(changes.boxed())
    }
}

/// A wrapper that adds tracing to an attachment store.
pub struct TracingAttachmentStore<S: AttachmentClient> {
    inner: S,
}

impl<S: AttachmentClient> TracingAttachmentStore<S> {
    /// Create a new tracing store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Get the wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: AttachmentClient> AttachmentClient for TracingAttachmentStore<S> {
    async fn list(&self, namespace: &str) -> Result<Vec<DebugAttachment>> {
        let result = self.inner.list(namespace).await;
        if let Ok(ref attachments) = result {
            tracing::trace!(namespace, count = attachments.len(), "Listed attachments");
        }
        result
    }

    async fn get(&self, reference: &AttachmentRef) -> Result<Option<DebugAttachment>> {
        tracing::trace!(attachment = %reference, "Reading attachment");
        self.inner.get(reference).await
    }

    async fn create(&self, attachment: DebugAttachment) -> Result<DebugAttachment> {
        tracing::debug!(attachment = %attachment.reference, "Creating attachment");
        self.inner.create(attachment).await
    }

    async fn update_status(
        &self,
        reference: &AttachmentRef,
        status: AttachmentStatus,
    ) -> Result<DebugAttachment> {
        tracing::debug!(
            attachment = %reference,
            state = %status.state,
            address = %status.debug_server_address,
            "Updating attachment status"
        );
        let result = self.inner.update_status(reference, status).await;
        if let Err(ref e) = result {
            tracing::debug!(attachment = %reference, error = %e, "Status update failed");
        }
        result
    }

    async fn delete(&self, reference: &AttachmentRef) -> Result<()> {
        tracing::debug!(attachment = %reference, "Deleting attachment");
        self.inner.delete(reference).await
    }

    async fn watch(&self, namespaces: &[String]) -> Result<ChangeStream> {
        tracing::debug!(namespaces = ?namespaces, "Watching namespaces");
        self.inner.watch(namespaces).await
    }
}
