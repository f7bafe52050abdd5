use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shardctl_cluster::{ConsensusController, ControllerStats, ShardStatus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, instrument};
use uuid::Uuid;

type AppState = Arc<ConsensusController>;

lazy_static::lazy_static! {
    static ref SERVER_START_TIME: u64 = current_timestamp();
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Liveness check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub version: String,
}

/// One shard in the status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardReport {
    pub keyspace: String,
    pub shard: String,
    pub active: bool,
    pub primary_tablet: String,
    /// Last classification and when it started, once diagnosed
    pub last_result: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub status: ShardStatus,
}

/// Controller status report
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub controller_id: Uuid,
    pub timestamp: u64,
    pub stats: ControllerStats,
    pub shards: Vec<ShardReport>,
}

/// Liveness endpoint. Answers as long as the process serves HTTP.
#[instrument]
pub async fn health_liveness() -> Result<Json<LivenessResponse>, StatusCode> {
    let now = current_timestamp();
    Ok(Json(LivenessResponse {
        alive: true,
        timestamp: now,
        uptime_seconds: now.saturating_sub(*SERVER_START_TIME),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Per-shard status from the most recent diagnosis cycles.
///
/// Reads only the status collectors, never a shard's diagnosis lock.
#[instrument(skip(state))]
pub async fn debug_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let shards = state
        .shards()
        .iter()
        .map(|shard| {
            let status = shard.status();
            ShardReport {
                keyspace: shard.identity.keyspace.clone(),
                shard: shard.identity.shard.clone(),
                active: shard.is_active(),
                primary_tablet: shard.primary_tablet_alias(),
                last_result: status.diagnose_result.map(|r| r.to_string()),
                since: status.since,
                status,
            }
        })
        .collect();

    Ok(Json(StatusResponse {
        controller_id: state.config.controller_id,
        timestamp: current_timestamp(),
        stats: state.stats(),
        shards,
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_liveness))
        .route("/debug/status", get(debug_status))
        .with_state(state)
}

/// Serve the status endpoints until `shutdown` resolves
pub async fn start_status_server(
    addr: SocketAddr,
    controller: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(controller);

    info!("Starting status server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
