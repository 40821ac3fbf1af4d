//! # nodemeta - Managed etcd node metadata controller
//!
//! ## Initialization Sequence
//!
//! 1. **Configuration** - TOML file (optional) overlaid with CLI flags, then validated
//! 2. **Node Registry** - In-memory registry seeded with the configured nodes
//! 3. **Controller** - Node controller with the metadata handler registered
//! 4. **Run** - Workers reconcile until Ctrl+C
//!
//! ## Error Handling
//!
//! Initialization steps return `anyhow::Result` with context; any failure
//! halts startup with a clear error message.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nodemeta::cli::Cli;
use nodemeta::config::Config;
use nodemeta_events::{InMemoryNodeRegistry, NodeClient, NodeController};
use nodemeta_reconciler::{
    register_metadata_handlers, EnvIdentityProvider, IdentityProvider, StaticIdentityProvider,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_cli(&cli);
    config.validate().context("Invalid configuration")?;

    info!(
        etcd = !config.etcd.disabled,
        nodes = config.nodes.len(),
        "nodemeta starting"
    );

    let registry = init_registry(&config).await?;
    let client: Arc<dyn NodeClient> = registry.clone();
    let controller = Arc::new(NodeController::new(client, config.controller_config()));

    let (stop_tx, stop_rx) = watch::channel(false);
    register_metadata_handlers(&controller, init_identity(&cli, &config), stop_rx.clone()).await;

    let run = tokio::spawn(Arc::clone(&controller).run(stop_rx));

    info!("nodemeta is running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    let _ = stop_tx.send(true);
    run.await
        .context("Controller task aborted")?
        .context("Controller failed")?;

    for node in registry.list().await.context("Failed to list nodes")? {
        info!(
            node = %node.name,
            annotations = ?node.annotations,
            labels = ?node.labels,
            "Final node metadata"
        );
    }

    info!("nodemeta stopped gracefully");
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Seed the in-memory registry with the configured nodes.
async fn init_registry(config: &Config) -> Result<Arc<InMemoryNodeRegistry>> {
    let registry = InMemoryNodeRegistry::new_arc();
    for node in &config.nodes {
        registry
            .create(node.clone())
            .await
            .with_context(|| format!("Failed to seed node '{}'", node.name))?;
    }
    Ok(registry)
}

/// Pinned node name from the CLI, otherwise `NODE_NAME` on every sync.
fn init_identity(cli: &Cli, config: &Config) -> Arc<dyn IdentityProvider> {
    match &cli.node_name {
        Some(name) => Arc::new(StaticIdentityProvider::new(config.pinned_identity(name))),
        None => Arc::new(EnvIdentityProvider::new(config.member())),
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
