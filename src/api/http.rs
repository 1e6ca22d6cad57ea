//! HTTP API Server
//!
//! Serves the election snapshot for operators and `bullyctl`.

use std::sync::Arc;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::directory::NodeId;
use crate::election::{ElectionEngine, Phase};
use crate::error::{Error, Result};

/// HTTP status server
pub struct HttpServer {
    config: ApiConfig,
    engine: Arc<ElectionEngine>,
}

/// Health response
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: NodeId,
    pub is_leader: bool,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, engine: Arc<ElectionEngine>) -> Self {
        Self { config, engine }
    }

    /// Create the router
    pub fn router(engine: Arc<ElectionEngine>) -> Router {
        Router::new()
            .route("/status", get(handle_status))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(engine)
    }

    /// Serve until `shutdown` is cancelled
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = Self::router(self.engine);
        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

async fn handle_status(State(engine): State<Arc<ElectionEngine>>) -> impl IntoResponse {
    Json(engine.snapshot().await)
}

async fn handle_health(State(engine): State<Arc<ElectionEngine>>) -> impl IntoResponse {
    let phase = engine.phase().await;
    Json(HealthResponse {
        // Healthy once the node has settled on some leader
        healthy: matches!(phase, Phase::Leader | Phase::Follower),
        node_id: engine.id(),
        is_leader: phase == Phase::Leader,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::config::ElectionConfig;
    use crate::directory::{NodeIdentity, PeerDirectory};
    use crate::network::Messenger;
    use crate::protocol::Message;

    struct NullMessenger;

    #[async_trait]
    impl Messenger for NullMessenger {
        async fn send(&self, _target: NodeId, _message: Message) -> Result<()> {
            Ok(())
        }
    }

    fn engine() -> Arc<ElectionEngine> {
        let directory = PeerDirectory::new(2, vec![NodeIdentity::new(1, "127.0.0.1:1")]).unwrap();
        ElectionEngine::new(
            NodeIdentity::new(2, "127.0.0.1:2"),
            Arc::new(directory),
            ElectionConfig::default(),
            Arc::new(NullMessenger),
        )
    }

    async fn serve(engine: Arc<ElectionEngine>) -> (String, CancellationToken) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, HttpServer::router(engine))
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .unwrap();
        });
        (base, shutdown)
    }

    #[tokio::test]
    async fn test_health_reports_leadership() {
        let engine = engine();
        engine.declare_leader().await;
        let (base, shutdown) = serve(engine).await;

        let health: HealthResponse = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(
            health,
            HealthResponse { healthy: true, node_id: 2, is_leader: true }
        );
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_status_returns_snapshot() {
        let engine = engine();
        engine.on_leader(1).await;
        let (base, shutdown) = serve(engine).await;

        let status: serde_json::Value = reqwest::get(format!("{}/status", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(status["node_id"], 2);
        assert_eq!(status["phase"], "Follower");
        assert_eq!(status["leader_id"], 1);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_disabled_api_returns_immediately() {
        let server = HttpServer::new(ApiConfig::default(), engine());
        server.start(CancellationToken::new()).await.unwrap();
    }
}
