//! History and user preference handlers.

use super::{HistoryQuery, HistoryResponse};
use crate::api::AppState;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{PlatformStats, PreferencesUpdate, UserId, UserPreferences};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

fn history_db(state: &AppState) -> Result<Arc<Database>> {
    state
        .downloader
        .history()
        .cloned()
        .ok_or_else(|| Error::NotSupported("no history database is configured".to_string()))
}

/// GET /history/:user_id - Recent downloads of a user
#[utoipa::path(
    get,
    path = "/api/v1/history/{user_id}",
    tag = "history",
    params(
        ("user_id" = String, Path, description = "User ID"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "Most recent history entries", body = HistoryResponse),
        (status = 501, description = "No history database configured", body = crate::error::ApiError)
    )
)]
pub async fn get_user_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let db = history_db(&state)?;
    let user_id = UserId::from(user_id);
    let limit = state.history_limit(query.limit);

    let items = db.user_history(&user_id, limit).await?;
    let total = db.count_user_history(&user_id).await?;

    Ok(Json(HistoryResponse { items, total }))
}

/// GET /stats/platforms - Per-platform success and failure counters
#[utoipa::path(
    get,
    path = "/api/v1/stats/platforms",
    tag = "history",
    responses(
        (status = 200, description = "Counters for every platform seen", body = Vec<PlatformStats>),
        (status = 501, description = "No history database configured", body = crate::error::ApiError)
    )
)]
pub async fn platform_stats(State(state): State<AppState>) -> Result<Json<Vec<PlatformStats>>> {
    let db = history_db(&state)?;
    Ok(Json(db.platform_stats().await?))
}

/// GET /users/:user_id/preferences - Stored defaults of a user
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/preferences",
    tag = "history",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Stored preferences", body = UserPreferences),
        (status = 404, description = "User never stored preferences", body = crate::error::ApiError),
        (status = 501, description = "No history database configured", body = crate::error::ApiError)
    )
)]
pub async fn get_user_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPreferences>> {
    let db = history_db(&state)?;
    let user_id = UserId::from(user_id);
    db.get_user_preferences(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("no preferences stored for user {}", user_id)))
}

/// PUT /users/:user_id/preferences - Set a user's preferred quality and duration ceiling
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/preferences",
    tag = "history",
    params(("user_id" = String, Path, description = "User ID")),
    request_body = PreferencesUpdate,
    responses(
        (status = 200, description = "Preferences as stored after the update", body = UserPreferences),
        (status = 422, description = "Unknown quality preset"),
        (status = 501, description = "No history database configured", body = crate::error::ApiError)
    )
)]
pub async fn update_user_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<UserPreferences>> {
    let db = history_db(&state)?;
    let user_id = UserId::from(user_id);
    Ok(Json(db.update_user_preferences(&user_id, &update).await?))
}
