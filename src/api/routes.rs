use axum::{routing::post, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Version segment of every API path.
pub const API_VERSION: &str = "v03";

/// Build the full HTTP path for a short endpoint name such as `users/get`.
pub fn full_api_path(endpoint: &str) -> String {
    format!("/api/{API_VERSION}/{}", endpoint.trim_start_matches('/'))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&full_api_path("system/health"), post(handlers::health))
        .route(&full_api_path("system/caller"), post(handlers::caller))
        .fallback(handlers::unknown_endpoint)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
