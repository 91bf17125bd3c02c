//! Queue-wide handlers.

use crate::api::AppState;
use crate::types::QueueSnapshot;
use axum::{Json, extract::State};

/// GET /queue/stats - Get queue statistics
#[utoipa::path(
    get,
    path = "/api/v1/queue/stats",
    tag = "queue",
    responses(
        (status = 200, description = "Point-in-time queue snapshot", body = QueueSnapshot)
    )
)]
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueSnapshot> {
    Json(state.downloader.snapshot().await)
}
