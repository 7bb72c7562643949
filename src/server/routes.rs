//! Router configuration for the request service.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/parse-screenshot", post(handlers::parse_screenshot))
        .route("/static/:name", get(handlers::serve_result))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
