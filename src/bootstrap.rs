//! Agent assembly.
//!
//! ## Startup Sequence
//!
//! 1. **Cluster connection** - in-cluster or kubeconfig credentials
//! 2. **Namespace selection** - configured list, or every namespace found now
//! 3. **Reconciler** - store, process locator and debugger launcher wired into
//!    a syncer with a bounded task pool
//! 4. **Event loop** - watch, snapshot and sync until stopped
//!
//! Any failure before the event loop is running aborts startup. After that,
//! errors are logged and the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kubedbg_api::{AttachmentClient, EventLoop, LoopStopper, RunningLoop, TracingAttachmentStore};
use kubedbg_kube::{
    ContainerProcessLocator, CredentialMode, KubeAttachmentClient, connect, discover_namespaces,
};
use kubedbg_reconciler::{DebuggerSession, ProcessLocator, ReconcilerBuilder, ReconciliationSyncer};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn};

use crate::config::AgentConfig;
use crate::debugger::HeadlessDebugger;

/// How long shutdown waits for in-flight attach/remove tasks.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(25);

/// The collaborators an agent runs against.
pub struct AgentParts {
    /// Where DebugAttachments live.
    pub store: Arc<dyn AttachmentClient>,
    /// Finds the process to debug.
    pub locator: Arc<dyn ProcessLocator>,
    /// Starts and stops debug servers.
    pub debugger: Arc<dyn DebuggerSession>,
}

/// What shutdown observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Errors the event loop reported while running.
    pub errors: usize,
    /// Whether every in-flight task finished within the grace period.
    pub drained: bool,
}

/// A running agent.
pub struct Agent {
    syncer: Arc<ReconciliationSyncer>,
    stopper: LoopStopper,
    handle: JoinHandle<()>,
    error_drain: JoinHandle<usize>,
}

impl Agent {
    /// Build the reconciler and start watching `namespaces`.
    ///
    /// # Errors
    ///
    /// Fails if the reconciler configuration is invalid or the watch cannot
    /// be established.
    pub async fn start(parts: AgentParts, config: &AgentConfig, namespaces: Vec<String>) -> Result<Self> {
        let span = info_span!("kubedbg", node = config.node_name.as_deref().unwrap_or("unknown"));

        let syncer = ReconcilerBuilder::new()
            .with_store(Arc::clone(&parts.store))
            .with_locator(parts.locator)
            .with_debugger(parts.debugger)
            .with_config(config.reconciler())
            .with_span(span.clone())
            .build()
            .context("Failed to build reconciler")?;
        let syncer = Arc::new(syncer);

        let RunningLoop {
            mut errors,
            stopper,
            handle,
        } = EventLoop::new(parts.store, Arc::clone(&syncer), config.event_loop())
            .with_span(span)
            .run(namespaces)
            .await
            .context("Failed to start watching DebugAttachments")?;

        // The loop logs each error itself; keep the channel flowing and count.
        let error_drain = tokio::spawn(async move {
            let mut seen = 0_usize;
            while errors.recv().await.is_some() {
                seen = seen.saturating_add(1);
            }
            seen
        });

        Ok(Self {
            syncer,
            stopper,
            handle,
            error_drain,
        })
    }

    /// The reconciler driven by this agent.
    pub const fn syncer(&self) -> &Arc<ReconciliationSyncer> {
        &self.syncer
    }

    /// Stop the event loop, then give in-flight tasks up to `grace` to finish.
    ///
    /// # Errors
    ///
    /// Fails if the event loop task panicked.
    pub async fn shutdown(self, grace: Duration) -> Result<ShutdownReport> {
        self.stopper.stop();
        self.handle.await.context("Event loop task failed")?;
        let errors = self.error_drain.await.context("Error drain task failed")?;

        let pool = self.syncer.dispatcher().pool();
        let drained = tokio::time::timeout(grace, pool.wait_idle()).await.is_ok();
        if !drained {
            warn!(in_flight = pool.in_flight(), "Tasks still running at shutdown");
        }
        Ok(ShutdownReport { errors, drained })
    }
}

/// Connect to the cluster and run the agent until a shutdown signal.
///
/// Processes are looked up in this node's `proc_root`, so exactly one agent
/// may watch a given set of namespaces. `node_name` is only recorded in logs;
/// a second agent on another node would claim the same resources and park the
/// ones whose pods it cannot see in `PendingAttachment`.
///
/// # Errors
///
/// Returns the first startup failure: invalid configuration, missing
/// credentials, namespace discovery or the initial watch.
pub async fn run_agent(config: AgentConfig) -> Result<()> {
    config.validate()?;
    info!(
        node = config.node_name.as_deref().unwrap_or("unknown"),
        in_cluster = config.in_cluster,
        "kubedbg agent starting"
    );

    let client = connect(CredentialMode::from_in_cluster(config.in_cluster))
        .await
        .context("Failed to connect to the cluster")?;

    let namespaces = if config.namespaces.is_empty() {
        discover_namespaces(client.clone())
            .await
            .context("Failed to discover namespaces")?
    } else {
        config.namespaces.clone()
    };
    info!(count = namespaces.len(), "Namespaces selected");

    let parts = AgentParts {
        store: Arc::new(TracingAttachmentStore::new(KubeAttachmentClient::new(
            client.clone(),
        ))),
        locator: Arc::new(ContainerProcessLocator::new(client, config.proc_root.clone())),
        debugger: Arc::new(HeadlessDebugger::new(
            config.debuggers.clone(),
            config.advertise_host.clone(),
        )),
    };
    let agent = Agent::start(parts, &config, namespaces).await?;

    info!("kubedbg agent running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    let report = agent.shutdown(SHUTDOWN_GRACE).await?;
    info!(
        errors = report.errors,
        drained = report.drained,
        "kubedbg agent stopped"
    );
    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM on Unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                return wait_for_ctrl_c().await;
            }
        };
        tokio::select! {
            () = wait_for_ctrl_c() => {}
            _ = terminate.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
