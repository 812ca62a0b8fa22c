use super::state::AppState;
use crate::error::Error;
use crate::protocol::GroundingReference;
use crate::session::{SessionStatus, Turn};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Option<String>,
    pub status: SessionStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session_id: Option<String>,
    pub status: SessionStatus,
    pub turns: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::ResourceInit(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::CONFLICT {
        warn!("Rejected request: {}", err);
    } else {
        error!("Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn session_response(state: &AppState, status: SessionStatus, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(SessionResponse {
            session_id: state.session.snapshot().session_id,
            status,
            message: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start a new voice session
pub async fn start_session(State(state): State<AppState>) -> Response {
    info!("Starting voice session");

    match state.session.start().await {
        Ok(status) => session_response(&state, status, "Session starting"),
        Err(e) => error_response(e),
    }
}

/// POST /session/microphone
/// Toggle microphone streaming
pub async fn toggle_microphone(State(state): State<AppState>) -> Response {
    match state.session.toggle_microphone().await {
        Ok(status) => {
            let message = if status.is_recording() {
                "Microphone on"
            } else {
                "Microphone off"
            };
            session_response(&state, status, message)
        }
        Err(e) => error_response(e),
    }
}

/// POST /session/end
/// End the current session, if any
pub async fn end_session(State(state): State<AppState>) -> Response {
    info!("Ending voice session");

    match state.session.end().await {
        Ok(status) => session_response(&state, status, "Session ended"),
        Err(e) => error_response(e),
    }
}

/// GET /session/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.session.snapshot();

    Json(StatusResponse {
        session_id: snapshot.session_id,
        status: snapshot.status,
        turns: snapshot.turns.len(),
        last_error: snapshot.last_error,
    })
}

/// GET /session/transcript
/// Conversation turns accumulated so far
pub async fn get_transcript(State(state): State<AppState>) -> Json<Vec<Turn>> {
    Json(state.session.snapshot().turns)
}

/// GET /session/grounding
pub async fn get_grounding(State(state): State<AppState>) -> Json<Vec<GroundingReference>> {
    Json(state.session.snapshot().grounding)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
