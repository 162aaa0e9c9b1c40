//! Agent configuration.
//!
//! # Hierarchy
//!
//! Later sources override earlier ones:
//! 1. Built-in defaults
//! 2. TOML file given with `--config`
//! 3. CLI flags and their environment variables (`NODE_NAME`, ...)
//!
//! # Example Config
//!
//! ```toml
//! in_cluster = true
//! max_concurrent = 8
//! resync_secs = 300
//! namespaces = ["dev", "staging"]
//! advertise_host = "10.0.3.17"
//! proc_root = "/host/proc"
//!
//! [debuggers]
//! dlv = "/usr/local/bin/dlv"
//! gdbserver = "/usr/bin/gdbserver"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use kubedbg_api::LoopConfig;
use kubedbg_reconciler::ReconcilerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::{GlobalArgs, RunArgs};

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

/// Everything the agent needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Use the pod's service account instead of a kubeconfig.
    pub in_cluster: bool,
    /// Node this agent runs on.
    pub node_name: Option<String>,
    /// Namespaces to watch; empty means every namespace found at startup.
    pub namespaces: Vec<String>,
    /// Attach/remove tasks allowed to run at once.
    pub max_concurrent: usize,
    /// Full pass interval in seconds; 0 disables it.
    pub resync_secs: u64,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Host put in front of debug server ports.
    pub advertise_host: String,
    /// Host process table.
    pub proc_root: PathBuf,
    /// Debugger binaries.
    pub debuggers: DebuggerPaths,
}

/// Where the debugger binaries live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerPaths {
    /// Delve.
    pub dlv: PathBuf,
    /// gdbserver.
    pub gdbserver: PathBuf,
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            in_cluster: false,
            node_name: None,
            namespaces: Vec::new(),
            max_concurrent: ReconcilerConfig::default().max_concurrent,
            resync_secs: 300,
            log_filter: "info".to_string(),
            advertise_host: "127.0.0.1".to_string(),
            proc_root: PathBuf::from("/proc"),
            debuggers: DebuggerPaths::default(),
        }
    }
}

impl Default for DebuggerPaths {
    fn default() -> Self {
        Self {
            dlv: PathBuf::from("dlv"),
            gdbserver: PathBuf::from("gdbserver"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

impl AgentConfig {
    /// Load defaults, then the file at `path` if given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] if the file is
    /// unreadable or malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), load_toml_file)
    }

    /// Apply the global flags.
    #[must_use]
    pub fn with_global_args(mut self, args: &GlobalArgs) -> Self {
        if args.in_cluster {
            self.in_cluster = true;
        }
        if let Some(filter) = &args.log_filter {
            self.log_filter.clone_from(filter);
        }
        self
    }

    /// Apply the `run` flags.
    #[must_use]
    pub fn with_run_args(mut self, args: &RunArgs) -> Self {
        if args.node_name.is_some() {
            self.node_name.clone_from(&args.node_name);
        }
        if !args.namespaces.is_empty() {
            self.namespaces.clone_from(&args.namespaces);
        }
        if let Some(max) = args.max_concurrent {
            self.max_concurrent = max;
        }
        if let Some(secs) = args.resync_secs {
            self.resync_secs = secs;
        }
        if let Some(host) = &args.advertise_host {
            self.advertise_host.clone_from(host);
        }
        if let Some(root) = &args.proc_root {
            self.proc_root.clone_from(root);
        }
        self
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.advertise_host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "advertise_host must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Reconciler settings.
    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            max_concurrent: self.max_concurrent,
        }
    }

    /// Event loop settings.
    pub fn event_loop(&self) -> LoopConfig {
        LoopConfig {
            resync_interval: (self.resync_secs > 0).then(|| Duration::from_secs(self.resync_secs)),
            ..LoopConfig::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

fn load_toml_file(path: &Path) -> Result<AgentConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
