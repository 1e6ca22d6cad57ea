//! Bully Election Node
//!
//! Runs one member of a bully-election group.
//!
//! Usage: `bully-node <NODE_ID> <LISTEN_PORT> <PEER>...`

use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bully_election::config::{parse_peer_args, ClusterConfig, LoggingConfig};
use bully_election::directory::NodeId;
use bully_election::node::ElectionNode;
use bully_election::error::Result;

/// Bully Election Node - joins a fixed group and elects the highest live id
#[derive(Parser)]
#[command(name = "bully-node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// This node's id (higher ids win elections)
    node_id: NodeId,

    /// Port to listen on for election traffic
    listen_port: u16,

    /// Peers as ID=HOST:PORT, ID=PORT, or bare PORT numbered by position
    #[arg(required = true, num_args = 1..)]
    peers: Vec<String>,

    /// Optional configuration file for timings, transport, API and logging
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host used for the listener and for peers given without a host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Serve the HTTP status API on this address
    #[arg(long)]
    api: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}\n", e);
            eprintln!("{}", Cli::command().render_usage());
            std::process::exit(2);
        }
    };

    // Initialize logging
    init_logging(&config.logging);

    let node = match ElectionNode::start(config).await {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("Failed to start election node: {}", e);
            return Err(e);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Received shutdown signal");
    node.shutdown().await;

    Ok(())
}

/// Merge the optional config file with the command line
fn build_config(cli: &Cli) -> Result<ClusterConfig> {
    let peers = parse_peer_args(cli.node_id, &cli.host, cli.listen_port, &cli.peers)?;
    let bind_address = format!("{}:{}", cli.host, cli.listen_port);

    let mut config = match &cli.config {
        Some(path) => ClusterConfig::read_file(path)?,
        None => ClusterConfig::new(cli.node_id, bind_address.clone(), Vec::new()),
    };

    config.node.id = cli.node_id;
    config.node.bind_address = bind_address;
    config.node.peers = peers;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(api) = &cli.api {
        config.api.enabled = true;
        config.api.bind_address = api.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Initialize logging
fn init_logging(config: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.level.as_str().into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
