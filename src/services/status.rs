//! Status HTTP server
//!
//! Read-only view over the blackboard and the coordination loop counters.
//! Runs alongside the loop and stops on the same shutdown token.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::coordination::ShutdownToken;
use crate::coordinator::{Blackboard, LoopMetrics, LoopMetricsSnapshot};
use crate::error::{CoordinatorError, Result};
use crate::queue::{PriorityQueueClient, QueueDepths};

/// Shared state for the status server
pub struct StatusState {
    pub started_at: DateTime<Utc>,
    pub blackboard: Arc<Blackboard>,
    pub metrics: Arc<LoopMetrics>,
    pub queue: PriorityQueueClient,
}

impl StatusState {
    pub fn new(blackboard: Arc<Blackboard>, metrics: Arc<LoopMetrics>, queue: PriorityQueueClient) -> Self {
        Self {
            started_at: Utc::now(),
            blackboard,
            metrics,
            queue,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub backend: &'static str,
    /// `None` when the backend could not be reached
    pub queues: Option<QueueDepths>,
    pub shipments: usize,
    pub at_risk: usize,
    pub coordinator: LoopMetricsSnapshot,
}

pub fn status_router(state: Arc<StatusState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(liveness_handler))
        .route("/status", get(status_handler))
        .route("/shipments", get(list_shipments))
        .route("/shipments/:id", get(get_shipment))
        .layer(cors)
        .with_state(state)
}

/// Status server
pub struct StatusServer {
    state: Arc<StatusState>,
    port: u16,
}

impl StatusServer {
    pub fn new(state: Arc<StatusState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve until `shutdown` fires
    pub async fn run(self, shutdown: ShutdownToken) -> Result<()> {
        let app = status_router(Arc::clone(&self.state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting status server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("Status server error: {}", e)))?;

        info!("Status server stopped");
        Ok(())
    }
}

/// Liveness check - is the process alive?
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn status_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    let queues = match state.queue.depths().await {
        Ok(depths) => Some(depths),
        Err(e) => {
            warn!(error = %e, "queue depth unavailable");
            None
        }
    };

    let shipments = state.blackboard.snapshot_all();
    let at_risk = shipments.iter().filter(|s| s.is_at_risk()).count();

    Json(StatusResponse {
        timestamp: Utc::now(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds().max(0) as u64,
        backend: state.queue.backend_name(),
        queues,
        shipments: shipments.len(),
        at_risk,
        coordinator: state.metrics.snapshot(),
    })
}

async fn list_shipments(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    Json(state.blackboard.snapshot_all())
}

async fn get_shipment(
    State(state): State<Arc<StatusState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.blackboard.snapshot(&id) {
        Some(shipment) => Json(shipment).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown shipment: {id}") })),
        )
            .into_response(),
    }
}
