//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// kubedbg - declarative debugger attachment for cluster containers
#[derive(Parser, Debug)]
#[command(name = "kubedbg-agent")]
#[command(version)]
#[command(about = "Attach debuggers to processes in cluster containers through DebugAttachment resources")]
#[command(
    long_about = "kubedbg watches DebugAttachment resources and drives each one through its lifecycle: it locates the target process, starts a headless debug server next to it, records the address, and tears it down again when the resource is deleted."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// TOML config file
    #[arg(short, long, global = true, env = "KUBEDBG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use in-cluster service account credentials
    #[arg(long, global = true, default_value_t = false)]
    pub in_cluster: bool,

    /// Log filter used when RUST_LOG is unset (e.g. "info,kubedbg_reconciler=debug")
    #[arg(long, global = true)]
    pub log_filter: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reconciliation agent
    Run(RunArgs),

    /// Print the DebugAttachment CustomResourceDefinition as JSON
    Crd,

    /// Request a debugger for a process in a container
    Attach(AttachArgs),

    /// Request removal of a debug attachment
    Detach(DetachArgs),
}

/// Flags for `run`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Node this agent runs on
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Namespace to watch (repeatable); default is every namespace
    #[arg(short, long = "namespace")]
    pub namespaces: Vec<String>,

    /// Attach/remove tasks allowed to run at once
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Seconds between full passes; 0 disables them
    #[arg(long)]
    pub resync_secs: Option<u64>,

    /// Host or IP clients use to reach debug servers
    #[arg(long, env = "POD_IP")]
    pub advertise_host: Option<String>,

    /// Host process table
    #[arg(long)]
    pub proc_root: Option<PathBuf>,
}

/// Flags for `attach`.
#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
    /// Namespace of the attachment and the target pod
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Attachment name
    #[arg(long)]
    pub name: String,

    /// Image of the target container
    #[arg(long)]
    pub image: String,

    /// Target pod
    #[arg(long)]
    pub pod: String,

    /// Target container
    #[arg(long)]
    pub container: String,

    /// Process name inside the container; default is its main process
    #[arg(long, default_value = "")]
    pub process: String,

    /// Debugger kind (dlv or gdb)
    #[arg(long, default_value = "dlv")]
    pub debugger: String,

    /// Seconds to wait for the debug server address; 0 returns immediately
    #[arg(long, default_value_t = 60)]
    pub wait_secs: u64,
}

/// Flags for `detach`.
#[derive(Args, Debug, Clone)]
pub struct DetachArgs {
    /// Namespace of the attachment
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Attachment name
    #[arg(long)]
    pub name: String,

    /// Seconds to wait for the resource to disappear; 0 returns immediately
    #[arg(long, default_value_t = 0)]
    pub wait_secs: u64,
}
