use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::get_status))
        // Device toggles
        .route("/mic/auto", post(handlers::set_mic_auto))
        .route("/cam/auto", post(handlers::set_cam_auto))
        .route("/visibility", post(handlers::set_visibility))
        // Dialogue
        .route("/brain/load", post(handlers::load_brain))
        .route("/say", post(handlers::say))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
