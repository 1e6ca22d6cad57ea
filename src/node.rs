//! Election Node
//!
//! Wires the listener, the dispatch loop, the heartbeat monitor and the
//! optional status API around one [`ElectionEngine`].

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::HttpServer;
use crate::config::ClusterConfig;
use crate::election::{ElectionEngine, HeartbeatMonitor};
use crate::network::{NetworkServer, TcpMessenger};
use crate::protocol::Message;
use crate::error::Result;

/// Inbound queue depth between the listener and the dispatch loop
const INCOMING_QUEUE: usize = 1024;

/// A running election node
pub struct ElectionNode {
    engine: Arc<ElectionEngine>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ElectionNode {
    /// Bind the configured address and start the node
    pub async fn start(config: ClusterConfig) -> Result<Self> {
        let server = NetworkServer::bind(&config.node.bind_address, &config.transport).await?;
        Self::start_with_listener(config, server).await
    }

    /// Start the node on an already bound listener
    pub async fn start_with_listener(config: ClusterConfig, server: NetworkServer) -> Result<Self> {
        config.validate()?;

        let directory = Arc::new(config.peer_directory()?);
        let messenger = Arc::new(TcpMessenger::new(Arc::clone(&directory), &config.transport));
        let engine = ElectionEngine::new(
            config.identity(),
            directory,
            config.election.clone(),
            messenger,
        );

        let local_addr = server.local_addr()?;
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        tracing::info!(
            "Starting election node {} on {} with {} peers",
            engine.id(),
            local_addr,
            config.node.peers.len()
        );

        // Listener -> dispatch loop, one message at a time
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_QUEUE);
        tasks.push(tokio::spawn(server.run(incoming_tx, shutdown.clone())));
        tasks.push(tokio::spawn(dispatch_loop(
            Arc::clone(&engine),
            incoming_rx,
            shutdown.clone(),
        )));

        let monitor = HeartbeatMonitor::new(Arc::clone(&engine));
        tasks.push(tokio::spawn(monitor.run(shutdown.clone())));

        if config.api.enabled {
            let http = HttpServer::new(config.api.clone(), Arc::clone(&engine));
            let token = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = http.start(token).await {
                    tracing::error!("HTTP API error: {}", e);
                }
            }));
        }

        // First election as soon as we can hear replies
        let initial = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            initial.initiate_election().await;
        }));

        Ok(Self {
            engine,
            local_addr,
            shutdown,
            tasks,
        })
    }

    /// The node's election engine
    pub fn engine(&self) -> &Arc<ElectionEngine> {
        &self.engine
    }

    /// Address the election listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop all tasks. In-flight sends may be dropped.
    pub async fn shutdown(self) {
        self.engine.stop();
        self.shutdown.cancel();
        for task in self.tasks {
            task.abort();
            let _ = task.await;
        }
        tracing::info!("Election node {} stopped", self.engine.id());
    }
}

/// Feed inbound messages to the engine in arrival order
async fn dispatch_loop(
    engine: Arc<ElectionEngine>,
    mut incoming_rx: mpsc::Receiver<(SocketAddr, Message)>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            received = incoming_rx.recv() => {
                match received {
                    Some((peer_addr, message)) => {
                        tracing::debug!("Node {} handling {} from {}", engine.id(), message, peer_addr);
                        engine.handle(message).await;
                    }
                    None => break,
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
