use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::announcementmodel::Announcement;

#[async_trait]
pub trait AnnouncementExt {
    async fn get_announcements(&self) -> Result<Vec<Announcement>, Error>;

    async fn mark_announcement_read(
        &self,
        announcement_id: Uuid,
        student_id: Uuid,
    ) -> Result<(), Error>;

    async fn unread_announcement_count(&self, student_id: Uuid) -> Result<i64, Error>;
}

#[async_trait]
impl AnnouncementExt for DBClient {
    async fn get_announcements(&self) -> Result<Vec<Announcement>, Error> {
        sqlx::query_as::<_, Announcement>(
            r#"
            SELECT id, author_id, title, body, created_at
            FROM announcements
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn mark_announcement_read(
        &self,
        announcement_id: Uuid,
        student_id: Uuid,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO announcement_reads (announcement_id, student_id)
            VALUES ($1, $2)
            ON CONFLICT (announcement_id, student_id) DO NOTHING
            "#,
        )
        .bind(announcement_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unread_announcement_count(&self, student_id: Uuid) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM announcements a
            WHERE NOT EXISTS (
                SELECT 1 FROM announcement_reads r
                WHERE r.announcement_id = a.id AND r.student_id = $1
            )
            "#,
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await
    }
}
