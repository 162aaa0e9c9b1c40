//! Headless debug servers started next to the target process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kubedbg_reconciler::{DebugServer, DebuggerSession, Error, ProcessId, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DebuggerPaths;

/// How long a debugger gets to start listening.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

const READY_POLL: Duration = Duration::from_millis(50);

/// Debuggers this agent can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerKind {
    /// Delve, for Go.
    Dlv,
    /// gdbserver.
    Gdb,
}

impl DebuggerKind {
    /// Parse the kind named in an attachment spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDebugger`] for any other name.
    pub fn parse(kind: &str) -> Result<Self> {
        match kind {
            "dlv" => Ok(Self::Dlv),
            "gdb" | "gdbserver" => Ok(Self::Gdb),
            other => Err(Error::unsupported_debugger(other)),
        }
    }

    /// Program and arguments serving `pid` on `port`.
    pub fn command_line(
        self,
        paths: &DebuggerPaths,
        pid: ProcessId,
        port: u16,
    ) -> (PathBuf, Vec<String>) {
        match self {
            Self::Dlv => (
                paths.dlv.clone(),
                vec![
                    "attach".to_string(),
                    pid.to_string(),
                    "--headless".to_string(),
                    format!("--listen=0.0.0.0:{port}"),
                    "--api-version=2".to_string(),
                    "--accept-multiclient".to_string(),
                ],
            ),
            Self::Gdb => (
                paths.gdbserver.clone(),
                vec![
                    "--attach".to_string(),
                    format!("0.0.0.0:{port}"),
                    pid.to_string(),
                ],
            ),
        }
    }
}

/// [`DebuggerSession`] running debuggers as child processes of the agent.
pub struct HeadlessDebugger {
    paths: DebuggerPaths,
    advertise_host: String,
    startup_timeout: Duration,
    children: Mutex<HashMap<String, Child>>,
}

impl HeadlessDebugger {
    /// Create a launcher advertising servers on `advertise_host`.
    pub fn new(paths: DebuggerPaths, advertise_host: impl Into<String>) -> Self {
        Self {
            paths,
            advertise_host: advertise_host.into(),
            startup_timeout: STARTUP_TIMEOUT,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Override how long a debugger gets to start listening.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Number of running debug servers.
    pub fn running(&self) -> usize {
        self.children().len()
    }

    fn children(&self) -> MutexGuard<'_, HashMap<String, Child>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait_until_listening(&self, kind: &str, port: u16, child: &mut Child) -> Result<()> {
        let deadline = Instant::now()
            .checked_add(self.startup_timeout)
            .unwrap_or_else(Instant::now);
        loop {
            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                return Ok(());
            }
            if let Some(status) = child
                .try_wait()
                .map_err(|e| Error::debugger_failed(kind, e.to_string()))?
            {
                return Err(Error::debugger_failed(kind, format!("exited early with {status}")));
            }
            if Instant::now() >= deadline {
                return Err(Error::debugger_failed(
                    kind,
                    format!("not listening on port {port} after {:?}", self.startup_timeout),
                ));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }
}

/// Ask the OS for a free TCP port.
async fn free_port(kind: &str) -> Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0))
        .await
        .map_err(|e| Error::debugger_failed(kind, format!("no free port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::debugger_failed(kind, e.to_string()))?
        .port();
    Ok(port)
}

#[async_trait]
impl DebuggerSession for HeadlessDebugger {
    async fn start(&self, pid: ProcessId, kind: &str) -> Result<DebugServer> {
        let parsed = DebuggerKind::parse(kind)?;
        let port = free_port(kind).await?;
        let (program, args) = parsed.command_line(&self.paths, pid, port);
        debug!(program = %program.display(), args = ?args, "Spawning debugger");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::debugger_failed(kind, format!("{}: {e}", program.display())))?;

        // Dropping the child on failure kills it.
        self.wait_until_listening(kind, port, &mut child).await?;

        let address = format!("{}:{port}", self.advertise_host);
        info!(pid, debugger = kind, address = %address, "Debug server listening");
        self.children().insert(address.clone(), child);
        Ok(DebugServer {
            pid,
            kind: kind.to_string(),
            address,
        })
    }

    async fn stop(&self, server: &DebugServer) -> Result<()> {
        let child = self.children().remove(&server.address);
        let Some(mut child) = child else {
            debug!(address = %server.address, "Debug server already stopped");
            return Ok(());
        };
        if let Err(e) = child.kill().await {
            warn!(address = %server.address, error = %e, "Failed to kill debug server");
            return Err(Error::debugger_failed(&server.kind, e.to_string()));
        }
        info!(pid = server.pid, address = %server.address, "Debug server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher() -> HeadlessDebugger {
        HeadlessDebugger::new(DebuggerPaths::default(), "10.0.3.17")
            .with_startup_timeout(Duration::from_millis(200))
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(DebuggerKind::parse("dlv").ok(), Some(DebuggerKind::Dlv));
        assert_eq!(DebuggerKind::parse("gdb").ok(), Some(DebuggerKind::Gdb));
        assert!(matches!(
            DebuggerKind::parse("lldb"),
            Err(Error::UnsupportedDebugger { kind }) if kind == "lldb"
        ));
    }

    #[test]
    fn test_dlv_command_line() {
        let (program, args) =
            DebuggerKind::Dlv.command_line(&DebuggerPaths::default(), 4821, 40123);
        assert_eq!(program, PathBuf::from("dlv"));
        assert_eq!(
            args,
            vec![
                "attach",
                "4821",
                "--headless",
                "--listen=0.0.0.0:40123",
                "--api-version=2",
                "--accept-multiclient",
            ]
        );
    }

    #[test]
    fn test_gdb_command_line() {
        let paths = DebuggerPaths {
            gdbserver: PathBuf::from("/usr/bin/gdbserver"),
            ..DebuggerPaths::default()
        };
        let (program, args) = DebuggerKind::Gdb.command_line(&paths, 77, 40000);
        assert_eq!(program, PathBuf::from("/usr/bin/gdbserver"));
        assert_eq!(args, vec!["--attach", "0.0.0.0:40000", "77"]);
    }

    #[tokio::test]
    async fn test_unsupported_kind_spawns_nothing() {
        let launcher = launcher();
        let result = launcher.start(1, "lldb").await;
        assert!(matches!(result, Err(Error::UnsupportedDebugger { .. })));
        assert_eq!(launcher.running(), 0);
    }

    #[tokio::test]
    async fn test_missing_binary_fails_start() {
        let paths = DebuggerPaths {
            dlv: PathBuf::from("/nonexistent/kubedbg/dlv"),
            ..DebuggerPaths::default()
        };
        let launcher = HeadlessDebugger::new(paths, "10.0.3.17");
        let result = launcher.start(1, "dlv").await;
        assert!(matches!(result, Err(Error::DebuggerFailed { .. })));
        assert_eq!(launcher.running(), 0);
    }

    #[tokio::test]
    async fn test_stop_unknown_server_is_ok() {
        let server = DebugServer {
            pid: 1,
            kind: "dlv".to_string(),
            address: "10.0.3.17:40000".to_string(),
        };
        assert!(launcher().stop(&server).await.is_ok());
    }
}
