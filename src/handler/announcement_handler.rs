use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::{
    db::announcementdb::AnnouncementExt,
    error::HttpError,
    middleware::JwtAuth,
    AppState,
};

pub fn announcement_handler() -> Router {
    Router::new()
        .route("/", get(get_announcements))
        .route("/:announcement_id/read", post(mark_read))
        .route("/unread-count", get(unread_count))
}

pub async fn get_announcements(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(_auth): Extension<JwtAuth>,
) -> Result<impl IntoResponse, HttpError> {
    let announcements = app_state
        .db_client
        .get_announcements()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": announcements
    })))
}

pub async fn mark_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(announcement_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .db_client
        .mark_announcement_read(announcement_id, auth.user.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success"
    })))
}

// Feeds the unread badge shown next to the announcements tab
pub async fn unread_count(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
) -> Result<impl IntoResponse, HttpError> {
    let count = app_state
        .db_client
        .unread_announcement_count(auth.user.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": { "unread_count": count }
    })))
}
