use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::analysis::patterns::AlertReport;
use crate::error::SentinelError;
use crate::ops::{OpsMetrics, OpsSnapshot};
use crate::store::{AuthorSummary, CommentStore, WindowMetrics};

// ─── Shared state ────────────────────────────────────────────────

/// State available to every handler via `State<Arc<ApiState>>`.
pub struct ApiState {
    pub store: Arc<dyn CommentStore>,
    pub ops: Arc<OpsMetrics>,
    pub alerts: tokio::sync::broadcast::Sender<AlertReport>,
    /// Video ids this process is monitoring.
    pub videos: Vec<String>,
}

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Store(String),
}

impl From<SentinelError> for ApiError {
    fn from(e: SentinelError) -> Self {
        Self::Store(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Store(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

fn known_video(state: &ApiState, video_id: &str) -> Result<(), ApiError> {
    if state.videos.iter().any(|v| v == video_id) {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!(
            "video '{video_id}' is not monitored"
        )))
    }
}

// ─── GET /api/status ─────────────────────────────────────────────
/// Runtime snapshot: uptime, tick/fetch latency percentiles, and the
/// pipeline counters.

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub videos: Vec<String>,
    #[serde(flatten)]
    pub ops: OpsSnapshot,
}

pub async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        videos: state.videos.clone(),
        ops: state.ops.snapshot(),
    })
}

// ─── GET /api/videos/:id/windows ─────────────────────────────────

pub async fn get_windows(
    State(state): State<Arc<ApiState>>,
    Path(video_id): Path<String>,
) -> Result<Json<Vec<WindowMetrics>>, ApiError> {
    known_video(&state, &video_id)?;
    Ok(Json(state.store.windows_for_video(&video_id).await?))
}

// ─── GET /api/videos/:id/authors ─────────────────────────────────

pub async fn get_authors(
    State(state): State<Arc<ApiState>>,
    Path(video_id): Path<String>,
) -> Result<Json<Vec<AuthorSummary>>, ApiError> {
    known_video(&state, &video_id)?;
    Ok(Json(state.store.author_summaries(&video_id).await?))
}

// ─── GET /api/alerts/stream ──────────────────────────────────────
/// Server-Sent Events feed of structured alert reports, pushed as
/// the classifiers emit them.

pub async fn alerts_stream(
    State(state): State<Arc<ApiState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.alerts.subscribe())
        // A lagged receiver just drops the missed reports.
        .filter_map(|report| report.ok())
        .map(|report| {
            let json = serde_json::to_string(&report).unwrap_or_default();
            Ok(Event::default().data(json))
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
