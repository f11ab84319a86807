use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usermodel::UserRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "chat_message_type", rename_all = "snake_case")]
pub enum MessageType {
    Text,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub complaint_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: UserRole,
    pub content: String,
    pub message_type: MessageType,
    // Each flag is flipped by the opposite party only, false -> true
    pub read_by_student: bool,
    pub read_by_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral typing broadcast. Never persisted; carried only on the
/// complaint's realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypingSignal {
    pub user_id: Uuid,
    pub role: UserRole,
    pub name: String,
    pub is_typing: bool,
}

/// The "who is currently typing" view held per subscriber.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TypingUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub name: String,
}
