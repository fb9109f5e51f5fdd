use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{self, ApiState};

/// Builds the operator-API `Router`: status, per-video metrics, and
/// the live alert stream.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        // ── Runtime status ──────────────────────────────────────
        .route("/api/status", get(handlers::get_status))
        // ── Per-video data ──────────────────────────────────────
        .route("/api/videos/:id/windows", get(handlers::get_windows))
        .route("/api/videos/:id/authors", get(handlers::get_authors))
        // ── Live alerts ─────────────────────────────────────────
        .route("/api/alerts/stream", get(handlers::alerts_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware ───────────────────────────────────
        .layer(CorsLayer::permissive())
}
