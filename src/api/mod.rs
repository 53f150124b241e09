//! HTTP API for health checks, swap listing and on-demand settlement

use crate::config::ApiConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::swap::SwapOrchestrator;
use crate::types::{ChainSwap, Hash};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SwapOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/platforms", get(get_platforms))
        .route("/platforms/:platform/resync", post(request_resync))
        .route("/swaps/settle", post(settle_swap))
        .route("/swaps/:address", get(get_pending_swaps))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, orchestrator: Arc<SwapOrchestrator>) -> BridgeResult<()> {
    let app = router(AppState { orchestrator });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Config(format!("Cannot bind API on {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| BridgeError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Bridge errors rendered as JSON with a matching status code
pub struct ApiError(BridgeError);

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BridgeError::InvalidPairing { .. }
            | BridgeError::UnknownPlatform(_)
            | BridgeError::InvalidHash(_) => StatusCode::BAD_REQUEST,
            BridgeError::SwapNotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("API request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Liveness plus persistent store reachability
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.orchestrator.health_check().await.is_ok();
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if database { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
        }),
    )
}

async fn get_platforms(State(state): State<AppState>) -> impl IntoResponse {
    Json(PlatformsResponse {
        native: state.orchestrator.native_platform().to_string(),
        foreign: state.orchestrator.platforms(),
    })
}

async fn get_pending_swaps(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<ChainSwap>>, ApiError> {
    Ok(Json(state.orchestrator.get_pending_swaps(&address).await?))
}

async fn settle_swap(
    State(state): State<AppState>,
    Json(request): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, ApiError> {
    let destination_hash = state
        .orchestrator
        .settle_swap(
            &request.source_platform,
            &request.destination_platform,
            &request.source_hash,
        )
        .await?;
    Ok(Json(SettleResponse {
        source_hash: request.source_hash,
        destination_hash,
    }))
}

async fn request_resync(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Json(request): Json<ResyncRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .request_resync(&platform, request.height)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

// Request and response types

#[derive(Deserialize)]
struct SettleRequest {
    source_platform: String,
    destination_platform: String,
    source_hash: Hash,
}

#[derive(Serialize)]
struct SettleResponse {
    source_hash: Hash,
    /// `None` while the swap is unresolved
    destination_hash: Option<Hash>,
}

#[derive(Deserialize)]
struct ResyncRequest {
    height: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    database: bool,
}

#[derive(Serialize)]
struct PlatformsResponse {
    native: String,
    foreign: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}
