//! Liveness endpoint for external monitors.
//!
//! `GET /` and `GET /health` report that the process is up; every other
//! path answers with a JSON 404.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub use routes::{AppState, HealthState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(routes::health))
        .route("/health", get(routes::health))
        .fallback(routes::not_found)
        .layer(cors)
        .with_state(state)
}

/// Bind the liveness server and serve it in the background until
/// `shutdown` fires.
///
/// Binding happens before this returns, so a taken port is reported to the
/// caller instead of panicking inside the task.
pub async fn spawn_health_server(
    state: AppState,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<JoinHandle<()>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health port {port}"))?;
    info!(port, "Health check server running on port {port}");

    let app = build_router(state);
    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;
        match served {
            Ok(()) => info!("HTTP server closed"),
            Err(e) => error!(error = %e, "Health server error"),
        }
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
