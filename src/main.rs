//! # kubedbg agent
//!
//! Entry point for the `kubedbg-agent` binary.
//!
//! ## Error Handling
//!
//! Every command returns `anyhow::Result`. A failure is printed with its
//! context chain and the process exits non-zero.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![forbid(clippy::expect_used)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kubedbg::cli::Cli;
use kubedbg::commands::{execute_command, resolve_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only the log filter is needed before the command runs.
    let default_filter = resolve_config(&cli.global, None)
        .map(|config| config.log_filter)
        .unwrap_or_else(|_| "info".to_string());
    init_tracing(&default_filter);

    execute_command(cli).await.context("kubedbg-agent failed")
}

/// Initialize tracing subscriber with environment filter.
///
/// `RUST_LOG` wins over `default_filter`.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
