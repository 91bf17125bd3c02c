//! Request management handlers.

use super::{CancelUserResponse, SubmitResponse};
use crate::api::AppState;
use crate::error::Result;
use crate::types::{RequestId, RequestView, Submission, UserId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

/// POST /downloads - Submit a media URL
#[utoipa::path(
    post,
    path = "/api/v1/downloads",
    tag = "downloads",
    request_body = crate::types::Submission,
    responses(
        (status = 202, description = "Request admitted", body = SubmitResponse),
        (status = 400, description = "Malformed URL or unknown quality preset", body = crate::error::ApiError),
        (status = 403, description = "Domain blocked by content policy", body = crate::error::ApiError),
        (status = 422, description = "Unsupported platform", body = crate::error::ApiError),
        (status = 429, description = "Rate limited or per-user limit reached", body = crate::error::ApiError),
        (status = 503, description = "Queue full or shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_download(
    State(state): State<AppState>,
    Json(submission): Json<Submission>,
) -> Result<impl IntoResponse> {
    let handle = state.downloader.submit(submission).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            id: handle.id(),
            position: handle.position(),
        }),
    ))
}

/// GET /downloads/:id - Get request status
#[utoipa::path(
    get,
    path = "/api/v1/downloads/{id}",
    tag = "downloads",
    params(
        ("id" = u64, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request status", body = RequestView),
        (status = 404, description = "Request not found", body = crate::error::ApiError)
    )
)]
pub async fn get_download(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RequestView>> {
    let view = state.downloader.status(RequestId(id)).await?;
    Ok(Json(view))
}

/// DELETE /downloads/:id - Cancel a queued or running request
#[utoipa::path(
    delete,
    path = "/api/v1/downloads/{id}",
    tag = "downloads",
    params(
        ("id" = u64, Path, description = "Request ID")
    ),
    responses(
        (status = 204, description = "Request cancelled"),
        (status = 404, description = "Request not found", body = crate::error::ApiError),
        (status = 409, description = "Request already finished", body = crate::error::ApiError)
    )
)]
pub async fn cancel_download(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    state.downloader.cancel(RequestId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /downloads/:id/delivered - Confirm an artifact was delivered
#[utoipa::path(
    post,
    path = "/api/v1/downloads/{id}/delivered",
    tag = "downloads",
    params(
        ("id" = u64, Path, description = "Request ID")
    ),
    responses(
        (status = 204, description = "Artifact removed from working storage"),
        (status = 404, description = "No artifact held for this request", body = crate::error::ApiError)
    )
)]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    state.downloader.confirm_delivery(RequestId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /users/:user_id/downloads - Cancel every request of a user
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/downloads",
    tag = "downloads",
    params(
        ("user_id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Number of requests cancelled", body = CancelUserResponse)
    )
)]
pub async fn cancel_user_downloads(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<CancelUserResponse> {
    let cancelled = state.downloader.cancel_user(&UserId::from(user_id)).await;
    Json(CancelUserResponse { cancelled })
}

/// GET /users/:user_id/position - Queue position of a user's first queued request
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/position",
    tag = "downloads",
    params(
        ("user_id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "1-based position, or null when nothing is queued")
    )
)]
pub async fn user_position(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let position = state.downloader.position(&UserId::from(user_id)).await;
    Json(json!({ "position": position }))
}
