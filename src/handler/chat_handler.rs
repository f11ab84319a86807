use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path,
    },
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::complaintdb::ComplaintExt,
    error::{ErrorMessage, HttpError},
    middleware::JwtAuth,
    models::{
        chatmodel::{ChatMessage, TypingUser},
        complaintmodel::Complaint,
        usermodel::UserRole,
    },
    service::conversation::{
        ConversationChannel, EventOutcome, Participant, MARK_READ_DELAY, TYPING_IDLE_TIMEOUT,
    },
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageDto {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

/// Frames pushed to the socket client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    History { messages: Vec<ChatMessage> },
    Message { message: ChatMessage },
    Typing { user: Option<TypingUser> },
    Error { message: String },
}

/// Frames accepted from the socket client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Typing { is_typing: bool },
    Send { content: String },
}

pub fn chat_handler() -> Router {
    Router::new()
        .route(
            "/:complaint_id/messages",
            get(get_messages).post(send_message),
        )
        .route("/:complaint_id/messages/read", put(mark_messages_read))
        .route("/:complaint_id/messages/unread-count", get(unread_count))
        .route("/:complaint_id/chat", get(chat_socket))
}

/// Only the complaint's student and admins may touch its conversation.
async fn authorize_participant(
    app_state: &AppState,
    auth: &JwtAuth,
    complaint_id: Uuid,
) -> Result<Complaint, HttpError> {
    let complaint = app_state
        .db_client
        .get_complaint(complaint_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Complaint not found"))?;

    if auth.user.role != UserRole::Admin && complaint.student_id != auth.user.id {
        return Err(HttpError::unauthorized(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }

    Ok(complaint)
}

/// Students on anonymous complaints keep their cached placeholder name in
/// the conversation too.
fn participant_for(auth: &JwtAuth, complaint: &Complaint) -> Participant {
    let display_name = if auth.user.role == UserRole::Student && complaint.is_anonymous {
        complaint.student_name_cached.clone()
    } else {
        auth.user.full_name.clone()
    };

    Participant {
        user_id: auth.user.id,
        role: auth.user.role,
        display_name,
    }
}

pub async fn get_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    authorize_participant(&app_state, &auth, complaint_id).await?;

    let messages = app_state
        .chat_service
        .history(complaint_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": messages
    })))
}

pub async fn send_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
    Json(body): Json<SendMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;
    authorize_participant(&app_state, &auth, complaint_id).await?;

    let content = body.content.trim();
    if content.is_empty() {
        return Err(HttpError::bad_request("Message cannot be empty"));
    }

    let message = app_state
        .chat_service
        .send_message(complaint_id, auth.user.id, auth.user.role, content.to_string())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": message
    })))
}

pub async fn mark_messages_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    authorize_participant(&app_state, &auth, complaint_id).await?;

    let marked = app_state
        .chat_service
        .mark_read(complaint_id, auth.user.role)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": { "marked": marked }
    })))
}

pub async fn unread_count(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    authorize_participant(&app_state, &auth, complaint_id).await?;

    let count = app_state
        .chat_service
        .unread_count(complaint_id, auth.user.role)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": { "unread_count": count }
    })))
}

// Live conversation socket. Authorization happens before the upgrade; the
// socket itself then speaks ClientFrame/ServerFrame JSON.
pub async fn chat_socket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JwtAuth>,
    Path(complaint_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, HttpError> {
    let complaint = authorize_participant(&app_state, &auth, complaint_id).await?;
    let participant = participant_for(&auth, &complaint);
    let chat = app_state.chat_service.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        match ConversationChannel::open(chat, complaint_id, participant).await {
            Ok(channel) => handle_socket(socket, channel).await,
            Err(e) => tracing::error!(
                "failed to open conversation for complaint {}: {}",
                complaint_id,
                e
            ),
        }
    }))
}

async fn handle_socket(socket: WebSocket, mut channel: ConversationChannel) {
    let (mut sink, mut stream) = socket.split();

    let history = ServerFrame::History {
        messages: channel.messages().to_vec(),
    };
    if send_frame(&mut sink, &history).await.is_err() {
        channel.close();
        return;
    }

    // Local typing auto-clears after keyboard silence; foreign inserts are
    // marked read shortly after delivery rather than instantly.
    let mut typing_idle: Option<Instant> = None;
    let mut pending_mark_read: Option<Instant> = None;

    loop {
        let typing_expiry = channel.typing_deadline();

        tokio::select! {
            event = channel.next_event() => {
                let Some(event) = event else { break };
                match channel.apply_event(event, Instant::now()) {
                    EventOutcome::Appended { message, from_other_party } => {
                        if from_other_party && pending_mark_read.is_none() {
                            pending_mark_read = Some(Instant::now() + MARK_READ_DELAY);
                        }
                        if send_frame(&mut sink, &ServerFrame::Message { message })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    EventOutcome::TypingChanged => {
                        let user = channel.typing_user();
                        if send_frame(&mut sink, &ServerFrame::Typing { user })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    EventOutcome::Ignored => {}
                }
            }

            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    WsMessage::Text(text) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Typing { is_typing }) => {
                                channel.set_typing(is_typing);
                                typing_idle = is_typing
                                    .then(|| Instant::now() + TYPING_IDLE_TIMEOUT);
                            }
                            Ok(ClientFrame::Send { content }) => {
                                typing_idle = None;
                                if let Err(e) = channel.send(&content).await {
                                    tracing::error!("failed to persist chat message: {}", e);
                                    let error = ServerFrame::Error {
                                        message: "Failed to send message".to_string(),
                                    };
                                    if send_frame(&mut sink, &error).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(_) => {
                                let error = ServerFrame::Error {
                                    message: "Unrecognized frame".to_string(),
                                };
                                if send_frame(&mut sink, &error).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }

            _ = wait_until(typing_idle), if typing_idle.is_some() => {
                typing_idle = None;
                channel.set_typing(false);
            }

            _ = wait_until(pending_mark_read), if pending_mark_read.is_some() => {
                pending_mark_read = None;
                if let Err(e) = channel.mark_read().await {
                    tracing::error!("failed to mark messages read: {}", e);
                }
            }

            // Remote typing claim went stale without an explicit stop frame
            _ = wait_until(typing_expiry), if typing_expiry.is_some() => {
                let user = channel.typing_user();
                if user.is_none() {
                    if send_frame(&mut sink, &ServerFrame::Typing { user: None })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    }

    channel.close();
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(payload) => sink.send(WsMessage::Text(payload)).await,
        Err(e) => {
            tracing::error!("failed to encode chat frame: {}", e);
            Ok(())
        }
    }
}
