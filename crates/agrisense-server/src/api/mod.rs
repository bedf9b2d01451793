//! API routes and handlers

mod advisory;
mod health;
mod predict;
mod records;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Crop recommendation from soil/climate measurements
        .route("/predict", post(predict::recommend_crop))
        // Pest detection from an uploaded photograph; uploads can be large,
        // so the default body cap is lifted for this route only
        .route(
            "/advisory/pest-detect",
            post(advisory::pest_detect).layer(DefaultBodyLimit::disable()),
        )
        // Recently persisted predictions
        .route("/predictions/recent", get(records::recent_predictions))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
