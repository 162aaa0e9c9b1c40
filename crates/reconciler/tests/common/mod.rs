//! Fakes shared by the reconciler integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kubedbg_api::{
    AttachmentRef, AttachmentSpec, AttachmentState, DebugAttachment, InMemoryAttachmentStore,
    wait_for,
};
use kubedbg_reconciler::{
    ActionKind, DebugServer, DebuggerSession, Error, FailureReporter, ProcessId, ProcessLocator,
    ProcessTarget, ReconcilerBuilder, ReconciliationSyncer, Result,
};
use tokio::sync::Semaphore;

pub type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

pub const WAIT: Duration = Duration::from_secs(5);

/// A process visible inside a pod's container.
#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub pod: String,
    pub container: String,
    pub name: String,
    pub pid: ProcessId,
}

/// Locator over a fixed process table. Pods can be gated so their lookups
/// block until the test releases them.
#[derive(Default)]
pub struct FakeLocator {
    processes: Vec<FakeProcess>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl FakeLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, pod: &str, container: &str, name: &str, pid: ProcessId) -> Self {
        self.processes.push(FakeProcess {
            pod: pod.to_string(),
            container: container.to_string(),
            name: name.to_string(),
            pid,
        });
        self
    }

    /// Block lookups for `pod` until a permit is added to the returned gate.
    pub fn gate(&self, pod: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        if let Ok(mut gates) = self.gates.lock() {
            gates.insert(pod.to_string(), Arc::clone(&gate));
        }
        gate
    }

    fn gate_for(&self, pod: &str) -> Option<Arc<Semaphore>> {
        self.gates.lock().ok().and_then(|gates| gates.get(pod).cloned())
    }
}

#[async_trait]
impl ProcessLocator for FakeLocator {
    async fn resolve(&self, target: &ProcessTarget) -> Result<Option<ProcessId>> {
        if let Some(gate) = self.gate_for(&target.pod) {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::locator_failed(e.to_string()))?;
        }

        Ok(self
            .processes
            .iter()
            .filter(|p| p.pod == target.pod && p.container == target.container)
            .filter(|p| {
                target
                    .process_filter
                    .as_deref()
                    .is_none_or(|filter| p.name == filter)
            })
            .map(|p| p.pid)
            .min())
    }
}

/// Debugger that hands out loopback addresses and tracks live sessions.
pub struct FakeDebugger {
    next_port: AtomicU16,
    live: Mutex<HashSet<String>>,
}

impl Default for FakeDebugger {
    fn default() -> Self {
        Self {
            next_port: AtomicU16::new(40000),
            live: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeDebugger {
    pub fn live(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or_default()
    }
}

#[async_trait]
impl DebuggerSession for FakeDebugger {
    async fn start(&self, pid: ProcessId, kind: &str) -> Result<DebugServer> {
        if kind != "dlv" {
            return Err(Error::unsupported_debugger(kind));
        }
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let address = format!("127.0.0.1:{port}");
        if let Ok(mut live) = self.live.lock() {
            live.insert(address.clone());
        }
        Ok(DebugServer {
            pid,
            kind: kind.to_string(),
            address,
        })
    }

    async fn stop(&self, server: &DebugServer) -> Result<()> {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&server.address);
        }
        Ok(())
    }
}

/// Keeps every reported failure.
#[derive(Default)]
pub struct RecordingReporter {
    failures: Mutex<Vec<(AttachmentRef, ActionKind, String)>>,
}

impl RecordingReporter {
    pub fn failures(&self) -> Vec<(AttachmentRef, ActionKind, String)> {
        self.failures
            .lock()
            .map(|failures| failures.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FailureReporter for RecordingReporter {
    async fn report(&self, reference: &AttachmentRef, action: ActionKind, error: &Error) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((reference.clone(), action, error.to_string()));
        }
    }
}

/// Everything a test needs, wired the way the agent wires it.
pub struct Harness {
    pub store: Arc<InMemoryAttachmentStore>,
    pub locator: Arc<FakeLocator>,
    pub debugger: Arc<FakeDebugger>,
    pub reporter: Arc<RecordingReporter>,
    pub syncer: ReconciliationSyncer,
}

impl Harness {
    pub fn new(locator: FakeLocator) -> Result<Self> {
        let store = InMemoryAttachmentStore::new_arc();
        let locator = Arc::new(locator);
        let debugger = Arc::new(FakeDebugger::default());
        let reporter = Arc::new(RecordingReporter::default());
        let syncer = ReconcilerBuilder::new()
            .with_store(store.clone())
            .with_locator(locator.clone())
            .with_debugger(debugger.clone())
            .with_reporter(reporter.clone())
            .max_concurrent(4)
            .build()?;
        Ok(Self {
            store,
            locator,
            debugger,
            reporter,
            syncer,
        })
    }

    /// One pass over the current contents of `namespaces`.
    pub async fn pass(&self, namespaces: &[&str]) -> Result<kubedbg_reconciler::PassSummary> {
        let namespaces: Vec<String> = namespaces.iter().map(ToString::to_string).collect();
        let snapshot = kubedbg_api::AttachmentClient::snapshot(self.store.as_ref(), &namespaces)
            .await
            .map_err(Error::from)?;
        self.syncer.sync_pass(&snapshot).await
    }

    pub async fn idle(&self) {
        self.syncer.dispatcher().pool().wait_idle().await;
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Option<DebugAttachment> {
        kubedbg_api::AttachmentClient::get(self.store.as_ref(), &AttachmentRef::new(namespace, name))
            .await
            .ok()
            .flatten()
    }

    pub async fn wait_for_state(
        &self,
        namespace: &str,
        name: &str,
        state: AttachmentState,
    ) -> kubedbg_api::Result<Option<DebugAttachment>> {
        wait_for(
            self.store.as_ref(),
            &AttachmentRef::new(namespace, name),
            WAIT,
            |current| current.is_some_and(|a| a.state().is(state)),
        )
        .await
    }
}

/// The attach request used throughout: svc:v1 in pod-a/c0 under dlv.
pub fn svc_spec(pod: &str) -> AttachmentSpec {
    AttachmentSpec::new("svc:v1", pod, "c0", "dlv")
}
