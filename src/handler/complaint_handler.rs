use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::complaintdb::ComplaintExt,
    error::{ErrorMessage, HttpError},
    middleware::JwtAuth,
    models::{complaintmodel::*, usermodel::UserRole},
    service::{lifecycle, timeline},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateComplaintDto {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    pub category: ComplaintCategory,
    #[validate(length(min = 1, max = 100))]
    pub custom_category_text: Option<String>,
    pub is_anonymous: Option<bool>,
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusDto {
    pub status: ComplaintStatus,
    pub priority: Option<ComplaintPriority>,
    pub expected_version: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RespondDto {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    pub is_internal: Option<bool>,
    pub status: Option<ComplaintStatus>,
    pub priority: Option<ComplaintPriority>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SatisfactionDto {
    pub satisfaction: Satisfaction,
    #[validate(length(min = 1, max = 2000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CloseRequestDto {
    #[validate(length(max = 2000))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ClarificationDto {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
}

pub fn complaint_handler() -> Router {
    Router::new()
        .route("/", get(get_complaints).post(create_complaint))
        .route("/my", get(get_my_complaints))
        .route("/:complaint_id", get(get_complaint_detail))
        .route("/:complaint_id/status", put(update_status))
        .route("/:complaint_id/respond", post(respond))
        .route("/:complaint_id/reopen", post(reopen_complaint))
        .route("/:complaint_id/satisfaction", post(set_satisfaction))
        .route("/:complaint_id/close-request", post(request_close))
        .route("/:complaint_id/clarification", post(request_clarification))
        .route("/:complaint_id/notes", get(get_notes))
}

fn require_admin(auth: &JwtAuth) -> Result<(), HttpError> {
    if auth.user.role != UserRole::Admin {
        return Err(HttpError::unauthorized(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }
    Ok(())
}

async fn load_complaint(
    app_state: &AppState,
    complaint_id: Uuid,
) -> Result<Complaint, HttpError> {
    app_state
        .db_client
        .get_complaint(complaint_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Complaint not found"))
}

fn require_owner_or_admin(auth: &JwtAuth, complaint: &Complaint) -> Result<(), HttpError> {
    if auth.user.role != UserRole::Admin && complaint.student_id != auth.user.id {
        return Err(HttpError::unauthorized(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }
    Ok(())
}

fn require_owner(auth: &JwtAuth, complaint: &Complaint) -> Result<(), HttpError> {
    if auth.user.role != UserRole::Student || complaint.student_id != auth.user.id {
        return Err(HttpError::unauthorized(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }
    Ok(())
}

// Submit a complaint (students only). Priority is detected from the
// description once at submission and never re-evaluated.
pub async fn create_complaint(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Json(body): Json<CreateComplaintDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    if auth.user.role != UserRole::Student {
        return Err(HttpError::unauthorized(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }

    if body.category == ComplaintCategory::Other
        && body
            .custom_category_text
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
    {
        return Err(HttpError::bad_request(
            "custom_category_text is required when category is 'other'",
        ));
    }

    let is_anonymous = body.is_anonymous.unwrap_or(false);
    let student_name = if is_anonymous {
        "Anonymous Student".to_string()
    } else {
        auth.user.full_name.clone()
    };

    let priority = lifecycle::detect_priority(&body.description);

    let complaint = app_state
        .db_client
        .create_complaint(
            auth.user.id,
            student_name,
            is_anonymous,
            body.title,
            body.category,
            body.custom_category_text,
            body.description,
            priority,
            body.attachments,
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": complaint
    })))
}

fn page_offset(page: i32, limit: i32) -> i64 {
    (page as i64 - 1) * limit as i64
}

// Admin triage list: filtered page, ordered escalated-first then by
// priority. The ordering lives in the SQL so it holds across pages.
pub async fn get_complaints(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Query(params): Query<ComplaintQueryParams>,
) -> Result<impl IntoResponse, HttpError> {
    require_admin(&auth)?;

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = page_offset(page, limit);
    let limit = limit as i64;

    let complaints = app_state
        .db_client
        .get_complaints(limit, offset, params.status, params.priority, params.category)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": {
            "complaints": complaints,
            "page": page,
            "limit": limit
        }
    })))
}

pub async fn get_my_complaints(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
) -> Result<impl IntoResponse, HttpError> {
    let complaints = app_state
        .db_client
        .get_student_complaints(auth.user.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": complaints
    })))
}

// Complaint detail with notes and the projected case timeline. Students see
// public notes only; internal ones stay admin-side.
pub async fn get_complaint_detail(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let complaint = load_complaint(&app_state, complaint_id).await?;
    require_owner_or_admin(&auth, &complaint)?;

    let include_internal = auth.user.role == UserRole::Admin;
    let notes = app_state
        .db_client
        .get_resolution_notes(complaint_id, include_internal)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let timeline = timeline::project(&complaint, &notes);

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": {
            "complaint": complaint,
            "notes": notes,
            "timeline": timeline
        }
    })))
}

// Admin status/priority change, guarded by the state machine and by the
// version the admin last saw.
pub async fn update_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
    Json(body): Json<UpdateStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    require_admin(&auth)?;

    let complaint = load_complaint(&app_state, complaint_id).await?;

    if !lifecycle::admin_transition_allowed(complaint.status, body.status) {
        return Err(HttpError::bad_request(format!(
            "Cannot move a complaint from '{}' to '{}'",
            complaint.status.to_str(),
            body.status.to_str()
        )));
    }

    let priority = body.priority.unwrap_or(complaint.priority);

    let updated = app_state
        .db_client
        .update_complaint_status(complaint_id, body.expected_version, body.status, priority)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| {
            HttpError::conflict("Complaint was modified by someone else. Refresh and retry.")
        })?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": updated
    })))
}

// Admin reply: a resolution note, optionally internal, optionally combined
// with a status change in the same request.
pub async fn respond(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
    Json(body): Json<RespondDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;
    require_admin(&auth)?;

    let complaint = load_complaint(&app_state, complaint_id).await?;

    let note_type = if body.is_internal.unwrap_or(false) {
        NoteType::Internal
    } else {
        NoteType::Public
    };

    // A combined status change shares one transaction with the note, so a
    // version conflict leaves no dangling note behind
    let (complaint, note) = if let Some(status) = body.status {
        let expected_version = body.expected_version.ok_or_else(|| {
            HttpError::bad_request("expected_version is required when changing status")
        })?;

        if !lifecycle::admin_transition_allowed(complaint.status, status) {
            return Err(HttpError::bad_request(format!(
                "Cannot move a complaint from '{}' to '{}'",
                complaint.status.to_str(),
                status.to_str()
            )));
        }

        let priority = body.priority.unwrap_or(complaint.priority);
        app_state
            .db_client
            .add_note_with_status_update(
                complaint_id,
                auth.user.id,
                note_type,
                body.message,
                expected_version,
                status,
                priority,
            )
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?
            .ok_or_else(|| {
                HttpError::conflict("Complaint was modified by someone else. Refresh and retry.")
            })?
    } else {
        let note = app_state
            .db_client
            .add_resolution_note(complaint_id, auth.user.id, note_type, body.message)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?;
        (complaint, note)
    };

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": {
            "complaint": complaint,
            "note": note
        }
    })))
}

// Student pulls a resolved or closed complaint back to in_progress. Clears
// the satisfaction verdict and any pending close request.
pub async fn reopen_complaint(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let complaint = load_complaint(&app_state, complaint_id).await?;
    require_owner(&auth, &complaint)?;

    if !lifecycle::can_reopen(complaint.status) {
        return Err(HttpError::bad_request(
            "Only resolved or closed complaints can be reopened",
        ));
    }

    let reopened = app_state
        .db_client
        .reopen_complaint(complaint_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": reopened
    })))
}

// Student verdict on the outcome. An unsatisfied verdict records the
// feedback as a note and pushes the complaint straight back to in_progress.
pub async fn set_satisfaction(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
    Json(body): Json<SatisfactionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let complaint = load_complaint(&app_state, complaint_id).await?;
    require_owner(&auth, &complaint)?;

    if !lifecycle::can_set_satisfaction(&complaint) {
        return Err(HttpError::bad_request(
            "Satisfaction can only be recorded once, on a resolved or closed complaint",
        ));
    }

    let updated = match body.satisfaction {
        Satisfaction::Satisfied => app_state
            .db_client
            .set_satisfaction(complaint_id, Satisfaction::Satisfied)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?,
        Satisfaction::Unsatisfied => {
            let feedback = body
                .feedback
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| {
                    HttpError::bad_request("Feedback is required when reporting unsatisfied")
                })?;

            let updated = app_state
                .db_client
                .set_satisfaction(complaint_id, Satisfaction::Unsatisfied)
                .await
                .map_err(|e| HttpError::server_error(e.to_string()))?;

            app_state
                .db_client
                .add_resolution_note(
                    complaint_id,
                    auth.user.id,
                    NoteType::FeedbackUnsatisfied,
                    feedback,
                )
                .await
                .map_err(|e| HttpError::server_error(e.to_string()))?;

            // Unsatisfied always forces the case back open, regardless of
            // the admin-side transition rules
            app_state
                .db_client
                .update_complaint_status(
                    complaint_id,
                    updated.version,
                    ComplaintStatus::InProgress,
                    updated.priority,
                )
                .await
                .map_err(|e| HttpError::server_error(e.to_string()))?
                .ok_or_else(|| {
                    HttpError::conflict(
                        "Complaint was modified by someone else. Refresh and retry.",
                    )
                })?
        }
    };

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": updated
    })))
}

pub async fn request_close(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
    Json(body): Json<CloseRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let complaint = load_complaint(&app_state, complaint_id).await?;
    require_owner(&auth, &complaint)?;

    if !lifecycle::can_request_close(&complaint) {
        return Err(HttpError::bad_request(
            "A close request is already pending or the complaint is closed",
        ));
    }

    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Student has requested to close this complaint".to_string());

    let note = app_state
        .db_client
        .add_resolution_note(complaint_id, auth.user.id, NoteType::CloseRequest, message)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let updated = app_state
        .db_client
        .set_close_requested(complaint_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": {
            "complaint": updated,
            "note": note
        }
    })))
}

// Student asks the handling admin for more detail; lands on the shared
// timeline as a non-internal note.
pub async fn request_clarification(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
    Json(body): Json<ClarificationDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let complaint = load_complaint(&app_state, complaint_id).await?;
    require_owner(&auth, &complaint)?;

    let note = app_state
        .db_client
        .add_resolution_note(
            complaint_id,
            auth.user.id,
            NoteType::ClarificationRequest,
            body.message,
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": note
    })))
}

pub async fn get_notes(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let complaint = load_complaint(&app_state, complaint_id).await?;
    require_owner_or_admin(&auth, &complaint)?;

    let include_internal = auth.user.role == UserRole::Admin;
    let notes = app_state
        .db_client
        .get_resolution_notes(complaint_id, include_internal)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": notes
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offset_does_not_overflow_on_large_pages() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        // Widened before the multiply, so an absurd page number is just a
        // huge offset rather than an i32 overflow
        assert_eq!(page_offset(i32::MAX, 100), (i32::MAX as i64 - 1) * 100);
    }
}
