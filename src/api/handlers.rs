//! HTTP request handlers

use super::types::{HealthResponse, InboundSmsRequest, VersionResponse};
use super::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};

/// Empty TwiML document: acknowledges the webhook without an automatic reply
const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Inbound SMS webhook
        .route("/sms", post(inbound_sms))
        .route("/health", get(health))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Inbound SMS
// ============================================================

/// Runs the whole turn before acknowledging. The acknowledgment is the same
/// whether or not the turn delivered a reply, so the carrier never retries.
async fn inbound_sms(
    State(state): State<AppState>,
    Form(req): Form<InboundSmsRequest>,
) -> Result<Response, AppError> {
    match state.controller.handle_inbound(&req.from, &req.body).await {
        Ok(_) => Ok(twiml_ack()),
        Err(e) => {
            tracing::info!(error = %e, "Rejected inbound SMS");
            Err(AppError::BadRequest("Invalid request".to_string()))
        }
    }
}

fn twiml_ack() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        EMPTY_TWIML,
    )
        .into_response()
}

// ============================================================
// Service info
// ============================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, message).into_response()
    }
}
