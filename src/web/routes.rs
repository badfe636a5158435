use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/query", post(handlers::api::nl_query))
            .route("/analyze", post(handlers::api::analyze))
            .route("/schema", get(handlers::api::get_schema))
            .route("/cache/clear", post(handlers::api::clear_cache))
            .route("/status", get(handlers::api::system_status)),
    )
}
