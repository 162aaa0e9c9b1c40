//! CLI command handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kubedbg_api::{
    AttachmentClient, AttachmentRef, AttachmentSpec, AttachmentState, DebugAttachment,
    request_attach, request_delete, wait_for,
};
use kubedbg_kube::{CredentialMode, KubeAttachmentClient, connect, crd_json};
use tracing::info;

use crate::bootstrap::run_agent;
use crate::cli::{AttachArgs, Cli, Commands, DetachArgs, GlobalArgs, RunArgs};
use crate::config::AgentConfig;

/// Execute a CLI command.
///
/// This is the main command dispatcher that routes to the appropriate handler.
///
/// # Errors
///
/// Returns whatever the selected command fails with.
pub async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => cmd_run(&cli.global, &args).await,
        Commands::Crd => cmd_crd(),
        Commands::Attach(args) => cmd_attach(&cli.global, args).await,
        Commands::Detach(args) => cmd_detach(&cli.global, &args).await,
    }
}

/// Resolve the effective configuration for `global` and, for `run`, its flags.
///
/// # Errors
///
/// Fails if the config file cannot be read or parsed.
pub fn resolve_config(global: &GlobalArgs, run: Option<&RunArgs>) -> Result<AgentConfig> {
    let config = AgentConfig::load(global.config.as_deref())?.with_global_args(global);
    Ok(match run {
        Some(args) => config.with_run_args(args),
        None => config,
    })
}

/// Run the agent until a shutdown signal.
async fn cmd_run(global: &GlobalArgs, args: &RunArgs) -> Result<()> {
    run_agent(resolve_config(global, Some(args))?).await
}

/// Print the CustomResourceDefinition.
fn cmd_crd() -> Result<()> {
    let json = crd_json().context("Failed to render the CustomResourceDefinition")?;
    println!("{json}");
    Ok(())
}

/// Create an attachment and optionally wait for its address.
async fn cmd_attach(global: &GlobalArgs, args: AttachArgs) -> Result<()> {
    let client = operator_client(global).await?;
    let spec = AttachmentSpec::new(args.image, args.pod, args.container, args.debugger)
        .with_process_filter(args.process);

    let created = request_attach(client.as_ref(), &args.namespace, &args.name, spec)
        .await
        .with_context(|| format!("Failed to create DebugAttachment {}/{}", args.namespace, args.name))?;
    info!(attachment = %created.reference, "Attachment requested");

    if args.wait_secs == 0 {
        return Ok(());
    }

    let settled = wait_for(
        client.as_ref(),
        &created.reference,
        Duration::from_secs(args.wait_secs),
        |current| current.is_none_or(|a| a.state().is(AttachmentState::Attached)),
    )
    .await
    .context("Debug server did not come up")?;

    println!("{}", describe_outcome(&created.reference, settled.as_ref()));
    Ok(())
}

/// Put an attachment on the delete path and optionally wait until it is gone.
async fn cmd_detach(global: &GlobalArgs, args: &DetachArgs) -> Result<()> {
    let client = operator_client(global).await?;
    let updated = request_delete(client.as_ref(), &args.namespace, &args.name)
        .await
        .with_context(|| format!("Failed to request removal of {}/{}", args.namespace, args.name))?;
    info!(attachment = %updated.reference, "Removal requested");

    if args.wait_secs > 0 {
        wait_for(
            client.as_ref(),
            &updated.reference,
            Duration::from_secs(args.wait_secs),
            |current| current.is_none(),
        )
        .await
        .context("DebugAttachment was not removed in time")?;
        println!("{} removed", updated.reference);
    }
    Ok(())
}

async fn operator_client(global: &GlobalArgs) -> Result<Arc<dyn AttachmentClient>> {
    let config = resolve_config(global, None)?;
    let client = connect(CredentialMode::from_in_cluster(config.in_cluster))
        .await
        .context("Failed to connect to the cluster")?;
    Ok(Arc::new(KubeAttachmentClient::new(client)))
}

/// One line telling the operator where the debugger is, or why not.
fn describe_outcome(reference: &AttachmentRef, current: Option<&DebugAttachment>) -> String {
    match current
        .map(|a| a.status.debug_server_address.as_str())
        .filter(|address| !address.is_empty())
    {
        Some(address) => format!("{reference} attached at {address}"),
        None => format!("{reference} was removed before a debugger attached"),
    }
}
