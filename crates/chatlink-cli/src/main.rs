//! chatlink CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use chatlink_cli::{cli::Cli, commands::CommandDispatcher};
use chatlink_core::{EngineConfig, TransportConfig};
use chatlink_http::HttpBackend;
use chatlink_runtime::ClientRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    let config = EngineConfig::default().with_transport(TransportConfig {
        base_url: cli.backend_url.clone(),
        ..TransportConfig::default()
    });

    let backend =
        Arc::new(HttpBackend::new(&config.transport).context("failed to set up backend client")?);
    let runtime = ClientRuntime::new(Arc::clone(&backend) as Arc<dyn chatlink_core::Backend>, config);

    info!(backend_url = %cli.backend_url, "chatlink starting");
    CommandDispatcher::execute(cli, backend, runtime).await
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
