//! # HTTP API
//!
//! The player-facing surface of a node. A game frontend forwards player
//! commands here and seeds inventories while players connect.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                          |
//! |--------|-----------------------------|--------------------------------------|
//! | GET    | `/health`                   | Liveness probe                       |
//! | GET    | `/status`                   | Node id, version, tracked trades     |
//! | GET    | `/inventory/:player/:slot`  | Asset in a slot                      |
//! | PUT    | `/inventory/:player/:slot`  | Store an asset, register presence    |
//! | POST   | `/trade/initiate`           | Offer an asset to another player     |
//! | POST   | `/trade/accept`             | Accept a pending offer               |
//! | POST   | `/trade/deny`               | Refuse a pending offer               |
//!
//! Trade endpoints answer with the [`CommandReply`] shown to the player:
//! 200 when the command succeeded, 422 when it was refused.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use shardtrade_protocol::trade::AssetLockKey;
use shardtrade_protocol::{
    Asset, CommandReply, Inventory, MemoryInventory, PlayerDirectory, TradeCommands,
};

/// Shared state of every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub commands: TradeCommands,
    pub inventory: Arc<MemoryInventory>,
    pub directory: PlayerDirectory,
}

impl AppState {
    fn node_id(&self) -> &str {
        self.commands.coordinator().node_id()
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route(
            "/inventory/:player/:slot",
            get(get_asset_handler).put(put_asset_handler),
        )
        .route("/trade/initiate", post(initiate_handler))
        .route("/trade/accept", post(accept_handler))
        .route("/trade/deny", post(deny_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub version: String,
    /// Trades this node currently tracks.
    pub active_trades: usize,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Body of `PUT /inventory/:player/:slot`.
#[derive(Debug, Deserialize)]
pub struct PutAssetRequest {
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub bound: bool,
}

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub player: String,
    pub target: String,
    pub slot: u8,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub player: String,
    pub requester: String,
    pub slot: u8,
}

#[derive(Debug, Deserialize)]
pub struct DenyRequest {
    pub player: String,
    pub requester: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn command_response(reply: CommandReply) -> axum::response::Response {
    let status = if reply.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(reply)).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        node_id: state.node_id().to_string(),
        version: state.version.clone(),
        active_trades: state.commands.coordinator().registry().len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn get_asset_handler(
    State(state): State<AppState>,
    Path((player, slot)): Path<(String, u8)>,
) -> axum::response::Response {
    match state.inventory.asset(&player, slot) {
        Some(asset) => Json(asset).into_response(),
        None => error(
            StatusCode::NOT_FOUND,
            format!("{} has no asset in slot {}", player, slot),
        ),
    }
}

/// `PUT /inventory/:player/:slot`: stores the asset and records the player
/// as connected to this node. A slot reserved by a trade is refused with 409.
async fn put_asset_handler(
    State(state): State<AppState>,
    Path((player, slot)): Path<(String, u8)>,
    Json(body): Json<PutAssetRequest>,
) -> axum::response::Response {
    let coordinator = state.commands.coordinator();
    let lock = AssetLockKey::new(coordinator.node_id(), &player, slot);
    match coordinator.locks().holder(&lock).await {
        Ok(None) => {}
        Ok(Some(trade_id)) => {
            return error(
                StatusCode::CONFLICT,
                format!("slot {} is reserved by trade {}", slot, trade_id),
            );
        }
        Err(e) => {
            tracing::warn!(player = %player, slot, error = %e, "lock lookup failed");
            return error(StatusCode::SERVICE_UNAVAILABLE, "lock lookup failed");
        }
    }

    let mut asset = Asset::new(body.data);
    asset.bound = body.bound;

    if let Err(e) = state.inventory.put(&player, slot, asset.clone()) {
        return error(StatusCode::BAD_REQUEST, e.to_string());
    }
    if let Err(e) = state.directory.register(&player, state.node_id()).await {
        tracing::warn!(player = %player, error = %e, "presence registration failed");
        return error(StatusCode::SERVICE_UNAVAILABLE, "presence registration failed");
    }

    (StatusCode::CREATED, Json(asset)).into_response()
}

async fn initiate_handler(
    State(state): State<AppState>,
    Json(req): Json<InitiateRequest>,
) -> axum::response::Response {
    command_response(
        state
            .commands
            .initiate(&req.player, &req.target, req.slot)
            .await,
    )
}

async fn accept_handler(
    State(state): State<AppState>,
    Json(req): Json<AcceptRequest>,
) -> axum::response::Response {
    command_response(
        state
            .commands
            .accept(&req.player, &req.requester, req.slot)
            .await,
    )
}

async fn deny_handler(
    State(state): State<AppState>,
    Json(req): Json<DenyRequest>,
) -> axum::response::Response {
    command_response(state.commands.deny(&req.player, &req.requester).await)
}
