//! HTTP control surface
//!
//! Thin layer over the [`Session`](crate::Session): status reads come from
//! controller snapshots, writes are forwarded as controller or group commands.

pub mod handlers;
pub mod server;
pub mod sse;

use crate::session::Session;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

/// Build the application router with every route
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health))
        // Windows
        .route("/windows", get(handlers::list_windows))
        .route("/windows/:id", get(handlers::get_window))
        .route("/windows/:id/queue", post(handlers::set_queue))
        .route("/windows/:id/next", post(handlers::next))
        .route("/windows/:id/play", post(handlers::play))
        .route("/windows/:id/pause", post(handlers::pause))
        .route("/windows/:id/seek", post(handlers::seek))
        .route("/windows/:id/volume", post(handlers::set_volume))
        // Groups
        .route("/groups", get(handlers::list_groups))
        .route("/groups/:name", get(handlers::get_group))
        .route("/groups/:name/queue", post(handlers::set_group_queue))
        .route("/groups/:name/next", post(handlers::group_next))
        .route("/groups/:name/play", post(handlers::group_play))
        .route("/groups/:name/pause", post(handlers::group_pause))
        .route("/groups/:name/speed", post(handlers::group_speed))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
