//! CLI definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::Parser;

/// nodemeta - managed etcd node metadata controller
#[derive(Parser, Debug, Default)]
#[command(name = "nodemeta")]
#[command(version)]
#[command(about = "Keeps the local node's etcd member annotations and role label converged")]
#[command(
    long_about = "nodemeta watches node resources and, for the node this process runs on, publishes or retracts its etcd membership: the member name and peer address annotations and the etcd role label."
)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "NODEMETA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Pin the local node name instead of reading NODE_NAME on each sync
    #[arg(long)]
    pub node_name: Option<String>,

    /// This process does not run etcd; retract the metadata
    #[arg(long, default_value_t = false)]
    pub disable_etcd: bool,

    /// Etcd member name advertised on the local node
    #[arg(long)]
    pub member_name: Option<String>,

    /// Etcd peer address advertised on the local node
    #[arg(long)]
    pub member_address: Option<String>,

    /// Number of controller workers
    #[arg(long)]
    pub workers: Option<usize>,
}
