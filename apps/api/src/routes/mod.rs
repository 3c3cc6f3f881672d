pub mod health;
pub mod index;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::analysis::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index_handler))
        .route("/health", get(health::health_handler))
        // Interview videos have no size cap.
        .route(
            "/api/v1/videos",
            post(handlers::handle_upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/v1/videos/:session_id", delete(handlers::handle_delete))
        .route(
            "/api/v1/videos/:session_id/file",
            get(handlers::handle_preview),
        )
        .route(
            "/api/v1/videos/:session_id/analyze",
            post(handlers::handle_analyze),
        )
        .route(
            "/api/v1/videos/:session_id/status",
            get(handlers::handle_status),
        )
        .route(
            "/api/v1/videos/:session_id/cancel",
            post(handlers::handle_cancel),
        )
        .with_state(state)
}
