//! Platform capabilities the debug controller depends on.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

/// Operating-system process id.
pub type ProcessId = u32;

/// Where to look for the process to debug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTarget {
    /// Namespace of the pod.
    pub namespace: String,
    /// Pod name.
    pub pod: String,
    /// Container name within the pod.
    pub container: String,
    /// Process name filter; `None` picks the container's main process.
    pub process_filter: Option<String>,
}

impl fmt::Display for ProcessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.pod, self.container)?;
        if let Some(filter) = &self.process_filter {
            write!(f, " (process '{filter}')")?;
        }
        Ok(())
    }
}

/// Resolves a pod/container/process-name filter to a process id.
#[async_trait]
pub trait ProcessLocator: Send + Sync {
    /// `Ok(None)` when no running process matches.
    async fn resolve(&self, target: &ProcessTarget) -> Result<Option<ProcessId>>;
}

/// A running debug server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugServer {
    /// Process being debugged.
    pub pid: ProcessId,
    /// Debugger kind, e.g. `dlv`.
    pub kind: String,
    /// Address clients connect to.
    pub address: String,
}

/// Starts and stops debugger sessions.
#[async_trait]
pub trait DebuggerSession: Send + Sync {
    /// Attach a debugger of `kind` to `pid` and serve it on a reachable address.
    async fn start(&self, pid: ProcessId, kind: &str) -> Result<DebugServer>;

    /// Stop a session started by [`DebuggerSession::start`].
    async fn stop(&self, server: &DebugServer) -> Result<()>;
}
