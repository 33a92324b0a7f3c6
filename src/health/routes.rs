//! Liveness route handlers.
//!
//! All responses are JSON. State is shared via `Arc<HealthState>`.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct HealthState {
    pub service: String,
    pub version: String,
    pub started: Instant,
}

impl HealthState {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started: Instant::now(),
        }
    }
}

pub type AppState = Arc<HealthState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    /// Seconds since the process started serving.
    pub uptime: f64,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET / and GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.started.elapsed().as_secs_f64(),
        version: state.version.clone(),
    })
}

/// Any other path.
pub async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse { error: "Not Found".to_string() }),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
