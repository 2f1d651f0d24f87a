//! HTTP request handlers
//!
//! Implements REST endpoints for window and group control.

use super::AppState;
use crate::controller::{ControllerStatus, PlaybackController};
use crate::coordinator::{GroupHandle, GroupStatus};
use crate::queue::QueueItem;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    windows: usize,
    groups: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    /// 0-100 user-facing scale
    pub volume: u8,
}

#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    pub speed: f64,
}

type HandlerError = (StatusCode, Json<StatusResponse>);

fn error(code: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        code,
        Json(StatusResponse {
            status: message.into(),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

fn find_window<'a>(state: &'a AppState, id: &str) -> Result<&'a PlaybackController, HandlerError> {
    state
        .session
        .controller(id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("window not found: {}", id)))
}

fn find_group<'a>(state: &'a AppState, name: &str) -> Result<&'a GroupHandle, HandlerError> {
    state
        .session
        .group(name)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("group not found: {}", name)))
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "tessera_player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        windows: state.session.controllers().len(),
        groups: state.session.groups().len(),
    })
}

// ============================================================================
// Window Endpoints
// ============================================================================

/// GET /windows - Status of every window
pub async fn list_windows(State(state): State<AppState>) -> Json<Vec<ControllerStatus>> {
    Json(
        state
            .session
            .controllers()
            .iter()
            .map(|c| c.status())
            .collect(),
    )
}

/// GET /windows/:id - Status of one window
pub async fn get_window(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ControllerStatus>, HandlerError> {
    Ok(Json(find_window(&state, &id)?.status()))
}

/// POST /windows/:id/queue - Replace a window's queue
pub async fn set_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<QueueRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    let controller = find_window(&state, &id)?;
    info!(window = %id, items = req.items.len(), "Queue replace request");
    controller.set_queue(req.items);
    Ok(ok())
}

/// POST /windows/:id/next - Advance; `{"force": true}` skips an in-flight load
pub async fn next(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Option<Json<NextRequest>>,
) -> Result<Json<StatusResponse>, HandlerError> {
    let controller = find_window(&state, &id)?;
    let force = req.map(|Json(r)| r.force).unwrap_or(false);
    info!(window = %id, force, "Next request");
    controller.play_next(force);
    Ok(ok())
}

/// POST /windows/:id/play
pub async fn play(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, HandlerError> {
    find_window(&state, &id)?.play();
    Ok(ok())
}

/// POST /windows/:id/pause
pub async fn pause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, HandlerError> {
    find_window(&state, &id)?.pause();
    Ok(ok())
}

/// POST /windows/:id/seek
pub async fn seek(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    if req.position_ms < 0 {
        return Err(error(StatusCode::BAD_REQUEST, "position_ms must be non-negative"));
    }
    find_window(&state, &id)?.seek(req.position_ms);
    Ok(ok())
}

/// POST /windows/:id/volume
pub async fn set_volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    if req.volume > 100 {
        return Err(error(StatusCode::BAD_REQUEST, "volume must be 0-100"));
    }
    find_window(&state, &id)?.set_volume(f32::from(req.volume) / 100.0);
    Ok(ok())
}

// ============================================================================
// Group Endpoints
// ============================================================================

/// GET /groups - Aggregated status of every group
pub async fn list_groups(State(state): State<AppState>) -> Json<Vec<GroupStatus>> {
    Json(state.session.groups().iter().map(|g| g.status()).collect())
}

/// GET /groups/:name
pub async fn get_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<GroupStatus>, HandlerError> {
    Ok(Json(find_group(&state, &name)?.status()))
}

/// POST /groups/:name/queue - Give every member the same queue
pub async fn set_group_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<QueueRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    let group = find_group(&state, &name)?;
    info!(group = %name, items = req.items.len(), "Group queue replace request");
    group.set_queue(req.items);
    Ok(ok())
}

/// POST /groups/:name/next - Coordinated skip
pub async fn group_next(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, HandlerError> {
    find_group(&state, &name)?.next();
    Ok(ok())
}

/// POST /groups/:name/play
pub async fn group_play(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, HandlerError> {
    find_group(&state, &name)?.play();
    Ok(ok())
}

/// POST /groups/:name/pause
pub async fn group_pause(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, HandlerError> {
    find_group(&state, &name)?.pause();
    Ok(ok())
}

/// POST /groups/:name/speed
pub async fn group_speed(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SpeedRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    if !find_group(&state, &name)?.set_speed(req.speed) {
        return Err(error(StatusCode::BAD_REQUEST, "speed must be finite and non-negative"));
    }
    Ok(ok())
}
