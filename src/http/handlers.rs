use super::state::AppState;
use crate::preferences::DeviceKind;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub device: DeviceKind,
    pub enabled: bool,
    /// Whether the device is actually running after the toggle
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
pub struct SayRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SayResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct BrainResponse {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.companion.status().await;
    (StatusCode::OK, Json(status)).into_response()
}

/// POST /mic/auto
/// Persist the auto-listen preference and start or stop recognition
pub async fn set_mic_auto(
    State(state): State<AppState>,
    Json(req): Json<ToggleRequest>,
) -> impl IntoResponse {
    info!("Mic auto set to {}", req.enabled);

    if let Err(e) = state.companion.set_mic_auto(req.enabled) {
        error!("Failed to toggle mic: {:#}", e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
    }

    let active = state.companion.speech().state().is_active();
    (
        StatusCode::OK,
        Json(ToggleResponse {
            device: DeviceKind::Mic,
            enabled: req.enabled,
            active,
        }),
    )
        .into_response()
}

/// POST /cam/auto
/// Persist the auto-camera preference and open or close the camera
pub async fn set_cam_auto(
    State(state): State<AppState>,
    Json(req): Json<ToggleRequest>,
) -> impl IntoResponse {
    info!("Cam auto set to {}", req.enabled);

    match state.companion.set_cam_auto(req.enabled).await {
        Ok(active) if req.enabled && !active && state.companion.is_visible() => {
            warn!("Camera could not be started; auto camera turned off");
            error_response(
                StatusCode::CONFLICT,
                "Camera unavailable; auto camera turned off",
            )
        }
        Ok(active) => (
            StatusCode::OK,
            Json(ToggleResponse {
                device: DeviceKind::Cam,
                enabled: req.enabled,
                active,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to toggle camera: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// POST /visibility
pub async fn set_visibility(
    State(state): State<AppState>,
    Json(req): Json<VisibilityRequest>,
) -> impl IntoResponse {
    state.companion.set_visibility(req.visible).await;
    let status = state.companion.status().await;
    (StatusCode::OK, Json(status)).into_response()
}

/// POST /brain/load
/// Walk the model ladder until one loads
///
/// The walk runs in its own task so a client hanging up mid-download does
/// not cancel it.
pub async fn load_brain(State(state): State<AppState>) -> impl IntoResponse {
    let companion = Arc::clone(&state.companion);
    let walk = tokio::spawn(async move { companion.load_brain().await });

    match walk.await {
        Ok(Some(model)) => (StatusCode::OK, Json(BrainResponse { model })).into_response(),
        Ok(None) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Brain failed to load on this device.",
        ),
        Err(e) => {
            error!("Brain load task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Brain load task failed")
        }
    }
}

/// POST /say
/// Queue text as a finalized transcript
pub async fn say(State(state): State<AppState>, Json(req): Json<SayRequest>) -> impl IntoResponse {
    if req.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text must not be empty");
    }

    match state.companion.submit_transcript(req.text).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(SayResponse {
                status: "queued".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to queue transcript: {:#}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e))
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
