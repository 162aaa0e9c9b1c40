//! Attachment store backed by the Kubernetes API server.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};
use kubedbg_api::{
    AttachmentClient, AttachmentRef, AttachmentState, AttachmentStatus, ChangeStream,
    DebugAttachment, Error as StoreError, Result as StoreResult,
};
use serde_json::json;
use tracing::{debug, info};

use crate::crd::{DebugAttachmentResource, DebugAttachmentStatus};
use crate::error::Error;

/// Field manager recorded on status writes.
pub const FIELD_MANAGER: &str = "kubedbg-agent";

/// [`AttachmentClient`] over the `DebugAttachment` custom resource.
#[derive(Clone)]
pub struct KubeAttachmentClient {
    client: Client,
}

impl KubeAttachmentClient {
    /// Create a store client from a connected Kubernetes client.
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DebugAttachmentResource> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map an API server error onto the store's error kinds.
fn store_error(operation: &str, reference: &AttachmentRef, error: kube::Error) -> StoreError {
    let error = Error::from(error);
    match error.api_code() {
        Some(404) => StoreError::not_found(reference),
        Some(409) => StoreError::already_exists(reference),
        _ => StoreError::store_failed(operation, error.to_string()),
    }
}

fn from_resource(
    operation: &str,
    resource: DebugAttachmentResource,
) -> StoreResult<DebugAttachment> {
    DebugAttachment::try_from(resource)
        .map_err(|e| StoreError::store_failed(operation, e.to_string()))
}

fn check_status(reference: &AttachmentRef, status: &AttachmentStatus) -> StoreResult<()> {
    if status.is_consistent() {
        Ok(())
    } else {
        Err(StoreError::invalid_status(
            reference,
            "debugServerAddress must be set exactly when attached",
        ))
    }
}

#[async_trait]
impl AttachmentClient for KubeAttachmentClient {
    async fn list(&self, namespace: &str) -> StoreResult<Vec<DebugAttachment>> {
        let list = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::store_failed("list", Error::from(e).to_string()))?;
        list.items
            .into_iter()
            .map(|resource| from_resource("list", resource))
            .collect()
    }

    async fn get(&self, reference: &AttachmentRef) -> StoreResult<Option<DebugAttachment>> {
        let resource = self
            .api(&reference.namespace)
            .get_opt(&reference.name)
            .await
            .map_err(|e| store_error("get", reference, e))?;
        resource.map(|r| from_resource("get", r)).transpose()
    }

    async fn create(&self, attachment: DebugAttachment) -> StoreResult<DebugAttachment> {
        let reference = attachment.reference.clone();
        check_status(&reference, &attachment.status)?;

        let api = self.api(&reference.namespace);
        let created = api
            .create(&PostParams::default(), &DebugAttachmentResource::from(&attachment))
            .await
            .map_err(|e| store_error("create", &reference, e))?;
        debug!(attachment = %reference, "Created attachment");

        // The API server drops status on create; anything past the initial
        // state has to go through the status subresource.
        if attachment.state().is(AttachmentState::RequestingAttachment) {
            return from_resource("create", created);
        }
        self.update_status(&reference, attachment.status).await
    }

    async fn update_status(
        &self,
        reference: &AttachmentRef,
        status: AttachmentStatus,
    ) -> StoreResult<DebugAttachment> {
        check_status(reference, &status)?;

        let state = status.state.to_string();
        let patch = json!({ "status": DebugAttachmentStatus::from(status) });
        let updated = self
            .api(&reference.namespace)
            .patch_status(
                &reference.name,
                &PatchParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..PatchParams::default()
                },
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| store_error("update_status", reference, e))?;
        debug!(attachment = %reference, state = %state, "Updated status");
        from_resource("update_status", updated)
    }

    async fn delete(&self, reference: &AttachmentRef) -> StoreResult<()> {
        self.api(&reference.namespace)
            .delete(&reference.name, &DeleteParams::default())
            .await
            .map_err(|e| store_error("delete", reference, e))?;
        Ok(())
    }

    async fn watch(&self, namespaces: &[String]) -> StoreResult<ChangeStream> {
        info!(namespaces = ?namespaces, "Starting DebugAttachment watches");
        let watches = namespaces.iter().map(|namespace| {
            watcher(self.api(namespace), watcher::Config::default())
                .default_backoff()
                .filter_map(|event| async move {
                    match event {
                        // The initial listing is reported once, at InitDone.
                        Ok(watcher::Event::Init | watcher::Event::InitApply(_)) => None,
                        Ok(_) => Some(Ok(())),
                        Err(e) => Some(Err(StoreError::watch_failed(e.to_string()))),
                    }
                })
                .boxed()
        });
        Ok(stream::select_all(watches).boxed())
    }
}
