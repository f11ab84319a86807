use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::{
    chatmodel::{ChatMessage, MessageType},
    usermodel::UserRole,
};

#[async_trait]
pub trait ChatExt {
    async fn insert_message(
        &self,
        complaint_id: Uuid,
        sender_id: Uuid,
        sender_role: UserRole,
        message_type: MessageType,
        content: String,
    ) -> Result<ChatMessage, Error>;

    async fn get_messages(&self, complaint_id: Uuid) -> Result<Vec<ChatMessage>, Error>;

    /// Flip the reader's flag on every unread message authored by the
    /// opposite role. Monotonic and idempotent.
    async fn mark_messages_read(
        &self,
        complaint_id: Uuid,
        reader_role: UserRole,
    ) -> Result<u64, Error>;

    async fn unread_message_count(
        &self,
        complaint_id: Uuid,
        reader_role: UserRole,
    ) -> Result<i64, Error>;
}

const MESSAGE_COLUMNS: &str = "id, complaint_id, sender_id, sender_role, content, \
     message_type, read_by_student, read_by_admin, created_at";

fn read_flag_column(reader_role: UserRole) -> &'static str {
    match reader_role {
        UserRole::Student => "read_by_student",
        UserRole::Admin => "read_by_admin",
    }
}

fn other_role(role: UserRole) -> UserRole {
    match role {
        UserRole::Student => UserRole::Admin,
        UserRole::Admin => UserRole::Student,
    }
}

#[async_trait]
impl ChatExt for DBClient {
    async fn insert_message(
        &self,
        complaint_id: Uuid,
        sender_id: Uuid,
        sender_role: UserRole,
        message_type: MessageType,
        content: String,
    ) -> Result<ChatMessage, Error> {
        // The sender's own read flag is not a tracked fact; seed it true so
        // unread queries only ever count the other party's flag.
        sqlx::query_as::<_, ChatMessage>(&format!(
            r#"
            INSERT INTO complaint_messages
                (complaint_id, sender_id, sender_role, content, message_type,
                 read_by_student, read_by_admin)
            VALUES ($1, $2, $3, $4, $5,
                    $3 = 'student'::user_role, $3 = 'admin'::user_role)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(complaint_id)
        .bind(sender_id)
        .bind(sender_role)
        .bind(content)
        .bind(message_type)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_messages(&self, complaint_id: Uuid) -> Result<Vec<ChatMessage>, Error> {
        sqlx::query_as::<_, ChatMessage>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM complaint_messages
            WHERE complaint_id = $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(complaint_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn mark_messages_read(
        &self,
        complaint_id: Uuid,
        reader_role: UserRole,
    ) -> Result<u64, Error> {
        let flag = read_flag_column(reader_role);

        let result = sqlx::query(&format!(
            r#"
            UPDATE complaint_messages
            SET {flag} = true
            WHERE complaint_id = $1
              AND sender_role = $2
              AND {flag} = false
            "#
        ))
        .bind(complaint_id)
        .bind(other_role(reader_role))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn unread_message_count(
        &self,
        complaint_id: Uuid,
        reader_role: UserRole,
    ) -> Result<i64, Error> {
        let flag = read_flag_column(reader_role);

        sqlx::query_scalar::<_, i64>(&format!(
            r#"
            SELECT COUNT(*)
            FROM complaint_messages
            WHERE complaint_id = $1
              AND sender_role = $2
              AND {flag} = false
            "#
        ))
        .bind(complaint_id)
        .bind(other_role(reader_role))
        .fetch_one(&self.pool)
        .await
    }
}
