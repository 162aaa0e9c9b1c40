//! Resolves a pod/container/process-name filter to a host process id.
//!
//! The container id comes from the pod's container status. Host processes
//! belong to the container when their cgroup path mentions that id. The agent
//! must see the host's process table, usually by mounting `/proc` from the
//! node at `proc_root`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use kubedbg_reconciler::{ProcessId, ProcessLocator, ProcessTarget};
use tracing::debug;

use crate::error::{Error, Result};

/// One process found inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Host process id.
    pub pid: ProcessId,
    /// Short command name from `comm`.
    pub comm: String,
    /// First command-line argument.
    pub argv0: String,
}

impl ProcessEntry {
    /// Check whether `filter` names this process, by `comm` or by the base
    /// name of `argv[0]`.
    pub fn matches(&self, filter: &str) -> bool {
        self.comm == filter || Path::new(&self.argv0).file_name().is_some_and(|n| n == filter)
    }
}

/// Strip the runtime scheme from a container id (`containerd://abc` → `abc`).
pub fn parse_container_id(raw: &str) -> Option<&str> {
    let id = raw.split_once("://").map_or(raw, |(_, id)| id);
    Some(id).filter(|id| !id.is_empty())
}

/// Id of the running `container` in `pod`, if it has one.
pub fn container_id_of(pod: &Pod, container: &str) -> Option<String> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .find(|status| status.name == container)?
        .container_id
        .as_deref()
        .and_then(parse_container_id)
        .map(str::to_string)
}

/// Lowest pid among `entries` that passes `filter`; no filter takes them all.
pub fn select_process(entries: &[ProcessEntry], filter: Option<&str>) -> Option<ProcessId> {
    entries
        .iter()
        .filter(|entry| filter.is_none_or(|f| entry.matches(f)))
        .map(|entry| entry.pid)
        .min()
}

/// Scan `proc_root` for processes whose cgroup mentions `container_id`.
///
/// Processes that exit mid-scan are skipped.
///
/// # Errors
///
/// Returns [`Error::ProcessTable`] if `proc_root` itself cannot be read.
pub async fn scan_container(proc_root: &Path, container_id: &str) -> Result<Vec<ProcessEntry>> {
    let mut dir = tokio::fs::read_dir(proc_root)
        .await
        .map_err(|e| Error::process_table(proc_root, e))?;

    let mut found = Vec::new();
    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(|e| Error::process_table(proc_root, e))?
    {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<ProcessId>().ok())
        else {
            continue;
        };
        let path = entry.path();
        let Ok(cgroup) = tokio::fs::read_to_string(path.join("cgroup")).await else {
            continue;
        };
        if !cgroup.contains(container_id) {
            continue;
        }

        let comm = tokio::fs::read_to_string(path.join("comm"))
            .await
            .map(|comm| comm.trim_end().to_string())
            .unwrap_or_default();
        let argv0 = tokio::fs::read(path.join("cmdline"))
            .await
            .ok()
            .and_then(|raw| {
                raw.split(|b| *b == 0)
                    .next()
                    .map(|arg| String::from_utf8_lossy(arg).into_owned())
            })
            .unwrap_or_default();
        found.push(ProcessEntry { pid, comm, argv0 });
    }
    Ok(found)
}

/// [`ProcessLocator`] reading pod status from the API server and processes
/// from the node's procfs.
pub struct ContainerProcessLocator {
    client: Client,
    proc_root: PathBuf,
}

impl ContainerProcessLocator {
    /// Create a locator scanning `proc_root`.
    pub fn new(client: Client, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            proc_root: proc_root.into(),
        }
    }

    async fn container_id(&self, target: &ProcessTarget) -> Result<Option<String>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let pod = pods.get_opt(&target.pod).await?;
        Ok(pod.as_ref().and_then(|pod| container_id_of(pod, &target.container)))
    }
}

#[async_trait]
impl ProcessLocator for ContainerProcessLocator {
    async fn resolve(
        &self,
        target: &ProcessTarget,
    ) -> kubedbg_reconciler::Result<Option<ProcessId>> {
        let Some(container_id) = self.container_id(target).await? else {
            debug!(process = %target, "Container is not running");
            return Ok(None);
        };

        let entries = scan_container(&self.proc_root, &container_id).await?;
        let pid = select_process(&entries, target.process_filter.as_deref());
        debug!(
            process = %target,
            container_id = %container_id,
            candidates = entries.len(),
            pid = ?pid,
            "Scanned container processes"
        );
        Ok(pid)
    }
}
