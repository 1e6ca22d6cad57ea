//! BullyCtl - Command line tool for inspecting election nodes
//!
//! Usage:
//!   bullyctl status          - Show the node's full election state
//!   bullyctl leader          - Show which node this node follows
//!   bullyctl health          - Exit non-zero unless a leader is settled

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Bully Election Control Tool
#[derive(Parser)]
#[command(name = "bullyctl")]
#[command(about = "Inspect bully election nodes", long_about = None)]
struct Cli {
    /// Path to the node's config file (used to find the API address)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the node's election state
    Status {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Show the leader this node recognises
    Leader,
    /// Check that the node has settled on a leader
    Health,
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct StatusResponse {
    node_id: u64,
    phase: String,
    #[serde(default)]
    leader_id: Option<u64>,
    #[serde(default)]
    leadership_confirmed: bool,
    #[serde(default)]
    millis_since_announcement: u64,
    #[serde(default)]
    inactive_peers: Vec<u64>,
    #[serde(default)]
    retry_counts: BTreeMap<String, u32>,
    #[serde(default)]
    round: u64,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    healthy: bool,
    node_id: u64,
    is_leader: bool,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
}

fn default_api_bind() -> String {
    "127.0.0.1:8090".to_string()
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let endpoint = resolve_endpoint(&cli);

    let result = match &cli.command {
        Commands::Status { json } => show_status(&endpoint, *json).await,
        Commands::Leader => show_leader(&endpoint).await,
        Commands::Health => check_health(&endpoint).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Pick the API endpoint from the flag, the config file, or the default
fn resolve_endpoint(cli: &Cli) -> String {
    if let Some(endpoint) = &cli.endpoint {
        return endpoint.trim_end_matches('/').to_string();
    }

    let bind_address = cli
        .config
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.api.bind_address)
        .unwrap_or_else(default_api_bind);

    // Convert a wildcard bind address to localhost
    match bind_address.strip_prefix("0.0.0.0:") {
        Some(port) => format!("http://127.0.0.1:{}", port),
        None => format!("http://{}", bind_address),
    }
}

async fn fetch<T: serde::de::DeserializeOwned>(endpoint: &str, path: &str) -> Result<T, String> {
    let url = format!("{}{}", endpoint, path);
    let response = reqwest::get(&url)
        .await
        .map_err(|e| format!("Failed to connect to {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("{} returned {}", url, response.status()));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| format!("Invalid response from {}: {}", url, e))
}

async fn show_status(endpoint: &str, json: bool) -> Result<(), String> {
    if json {
        let raw: serde_json::Value = fetch(endpoint, "/status").await?;
        println!("{}", serde_json::to_string_pretty(&raw).map_err(|e| e.to_string())?);
        return Ok(());
    }

    let status: StatusResponse = fetch(endpoint, "/status").await?;

    println!();
    println!("Node {}", status.node_id);
    println!("{}", "─".repeat(40));
    println!("  {:<24} {}", "Phase", status.phase);
    println!("  {:<24} {}", "Leader", format_leader(status.leader_id));
    println!("  {:<24} {}", "Leadership confirmed", status.leadership_confirmed);
    println!("  {:<24} {} ms", "Since announcement", status.millis_since_announcement);
    println!("  {:<24} {}", "Election round", status.round);

    if status.inactive_peers.is_empty() {
        println!("  {:<24} none", "Inactive peers");
    } else {
        let peers: Vec<String> = status.inactive_peers.iter().map(|p| p.to_string()).collect();
        println!("  {:<24} {}", "Inactive peers", peers.join(", "));
    }

    for (peer, count) in &status.retry_counts {
        println!("  {:<24} {}", format!("Failed sends to {}", peer), count);
    }
    println!();

    Ok(())
}

async fn show_leader(endpoint: &str) -> Result<(), String> {
    let status: StatusResponse = fetch(endpoint, "/status").await?;
    println!("{}", format_leader(status.leader_id));
    Ok(())
}

async fn check_health(endpoint: &str) -> Result<(), String> {
    let health: HealthResponse = fetch(endpoint, "/health").await?;
    let role = if health.is_leader { "leader" } else { "follower" };

    if health.healthy {
        println!("Node {} is healthy ({})", health.node_id, role);
        Ok(())
    } else {
        Err(format!("Node {} has not settled on a leader", health.node_id))
    }
}

fn format_leader(leader_id: Option<u64>) -> String {
    match leader_id {
        Some(id) => format!("node {}", id),
        None => "none".to_string(),
    }
}
