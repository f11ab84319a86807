use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::complaintmodel::*;

#[async_trait]
pub trait ComplaintExt {
    async fn create_complaint(
        &self,
        student_id: Uuid,
        student_name_cached: String,
        is_anonymous: bool,
        title: String,
        category: ComplaintCategory,
        custom_category_text: Option<String>,
        description: String,
        priority: ComplaintPriority,
        attachments: Option<Vec<String>>,
    ) -> Result<Complaint, Error>;

    async fn get_complaint(&self, complaint_id: Uuid) -> Result<Option<Complaint>, Error>;

    async fn get_student_complaints(&self, student_id: Uuid) -> Result<Vec<Complaint>, Error>;

    async fn get_complaints(
        &self,
        limit: i64,
        offset: i64,
        status: Option<ComplaintStatus>,
        priority: Option<ComplaintPriority>,
        category: Option<ComplaintCategory>,
    ) -> Result<Vec<Complaint>, Error>;

    /// Version-conditioned admin update. Returns `None` when the expected
    /// version no longer matches (concurrent edit).
    async fn update_complaint_status(
        &self,
        complaint_id: Uuid,
        expected_version: i64,
        status: ComplaintStatus,
        priority: ComplaintPriority,
    ) -> Result<Option<Complaint>, Error>;

    async fn reopen_complaint(&self, complaint_id: Uuid) -> Result<Complaint, Error>;

    async fn set_satisfaction(
        &self,
        complaint_id: Uuid,
        satisfaction: Satisfaction,
    ) -> Result<Complaint, Error>;

    async fn set_close_requested(&self, complaint_id: Uuid) -> Result<Complaint, Error>;

    async fn escalate_stale_complaints(&self, stale_before: DateTime<Utc>) -> Result<u64, Error>;

    async fn add_resolution_note(
        &self,
        complaint_id: Uuid,
        author_id: Uuid,
        note_type: NoteType,
        message: String,
    ) -> Result<ResolutionNote, Error>;

    /// Note plus version-conditioned status update in one transaction.
    /// Returns `None` with nothing written when the expected version no
    /// longer matches.
    async fn add_note_with_status_update(
        &self,
        complaint_id: Uuid,
        author_id: Uuid,
        note_type: NoteType,
        message: String,
        expected_version: i64,
        status: ComplaintStatus,
        priority: ComplaintPriority,
    ) -> Result<Option<(Complaint, ResolutionNote)>, Error>;

    async fn get_resolution_notes(
        &self,
        complaint_id: Uuid,
        include_internal: bool,
    ) -> Result<Vec<ResolutionNote>, Error>;
}

const COMPLAINT_COLUMNS: &str = "id, student_id, student_name_cached, is_anonymous, title, \
     category, custom_category_text, description, priority, status, close_requested, \
     satisfaction, attachments, version, created_at, updated_at, closed_at";

const INSERT_NOTE_SQL: &str = r#"
    INSERT INTO resolution_notes (complaint_id, author_id, note_type, message)
    VALUES ($1, $2, $3, $4)
    RETURNING id, complaint_id, author_id, note_type, message, attachments, created_at
"#;

// closed_at is non-null exactly while the status is Closed; the version
// guard makes the update a no-op on a concurrent edit
fn update_status_sql() -> String {
    format!(
        r#"
        UPDATE complaints
        SET status = $3,
            priority = $4,
            closed_at = CASE WHEN $3 = 'closed'::complaint_status THEN NOW() ELSE NULL END,
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1 AND version = $2
        RETURNING {COMPLAINT_COLUMNS}
        "#
    )
}

fn create_complaint_sql() -> String {
    format!(
        r#"
        INSERT INTO complaints
            (student_id, student_name_cached, is_anonymous, title, category,
             custom_category_text, description, priority, attachments, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending'::complaint_status)
        RETURNING {COMPLAINT_COLUMNS}
        "#
    )
}

// Mirrors lifecycle::status_rank / priority_rank so the invariant holds
// across the whole paginated list, not just within one fetched page
fn list_complaints_sql() -> String {
    format!(
        r#"
        SELECT {COMPLAINT_COLUMNS}
        FROM complaints
        WHERE ($3::complaint_status IS NULL OR status = $3)
          AND ($4::complaint_priority IS NULL OR priority = $4)
          AND ($5::complaint_category IS NULL OR category = $5)
        ORDER BY
            CASE status
                WHEN 'escalated' THEN 0
                WHEN 'in_progress' THEN 1
                WHEN 'pending' THEN 2
                WHEN 'resolved' THEN 3
                WHEN 'closed' THEN 4
            END,
            CASE priority
                WHEN 'critical' THEN 0
                WHEN 'urgent' THEN 1
                WHEN 'normal' THEN 2
            END,
            created_at DESC
        LIMIT $1 OFFSET $2
        "#
    )
}

#[async_trait]
impl ComplaintExt for DBClient {
    async fn create_complaint(
        &self,
        student_id: Uuid,
        student_name_cached: String,
        is_anonymous: bool,
        title: String,
        category: ComplaintCategory,
        custom_category_text: Option<String>,
        description: String,
        priority: ComplaintPriority,
        attachments: Option<Vec<String>>,
    ) -> Result<Complaint, Error> {
        sqlx::query_as::<_, Complaint>(&create_complaint_sql())
        .bind(student_id)
        .bind(student_name_cached)
        .bind(is_anonymous)
        .bind(title)
        .bind(category)
        .bind(custom_category_text)
        .bind(description)
        .bind(priority)
        .bind(attachments)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_complaint(&self, complaint_id: Uuid) -> Result<Option<Complaint>, Error> {
        sqlx::query_as::<_, Complaint>(&format!(
            r#"
            SELECT {COMPLAINT_COLUMNS}
            FROM complaints
            WHERE id = $1
            "#
        ))
        .bind(complaint_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_student_complaints(&self, student_id: Uuid) -> Result<Vec<Complaint>, Error> {
        sqlx::query_as::<_, Complaint>(&format!(
            r#"
            SELECT {COMPLAINT_COLUMNS}
            FROM complaints
            WHERE student_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_complaints(
        &self,
        limit: i64,
        offset: i64,
        status: Option<ComplaintStatus>,
        priority: Option<ComplaintPriority>,
        category: Option<ComplaintCategory>,
    ) -> Result<Vec<Complaint>, Error> {
        sqlx::query_as::<_, Complaint>(&list_complaints_sql())
        .bind(limit)
        .bind(offset)
        .bind(status)
        .bind(priority)
        .bind(category)
        .fetch_all(&self.pool)
        .await
    }

    async fn update_complaint_status(
        &self,
        complaint_id: Uuid,
        expected_version: i64,
        status: ComplaintStatus,
        priority: ComplaintPriority,
    ) -> Result<Option<Complaint>, Error> {
        sqlx::query_as::<_, Complaint>(&update_status_sql())
            .bind(complaint_id)
            .bind(expected_version)
            .bind(status)
            .bind(priority)
            .fetch_optional(&self.pool)
            .await
    }

    async fn add_note_with_status_update(
        &self,
        complaint_id: Uuid,
        author_id: Uuid,
        note_type: NoteType,
        message: String,
        expected_version: i64,
        status: ComplaintStatus,
        priority: ComplaintPriority,
    ) -> Result<Option<(Complaint, ResolutionNote)>, Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Complaint>(&update_status_sql())
            .bind(complaint_id)
            .bind(expected_version)
            .bind(status)
            .bind(priority)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(updated) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        let note = sqlx::query_as::<_, ResolutionNote>(INSERT_NOTE_SQL)
            .bind(complaint_id)
            .bind(author_id)
            .bind(note_type)
            .bind(message)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some((updated, note)))
    }

    async fn reopen_complaint(&self, complaint_id: Uuid) -> Result<Complaint, Error> {
        sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET status = 'in_progress'::complaint_status,
                satisfaction = NULL,
                close_requested = false,
                closed_at = NULL,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COMPLAINT_COLUMNS}
            "#
        ))
        .bind(complaint_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn set_satisfaction(
        &self,
        complaint_id: Uuid,
        satisfaction: Satisfaction,
    ) -> Result<Complaint, Error> {
        sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET satisfaction = $2,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COMPLAINT_COLUMNS}
            "#
        ))
        .bind(complaint_id)
        .bind(satisfaction)
        .fetch_one(&self.pool)
        .await
    }

    async fn set_close_requested(&self, complaint_id: Uuid) -> Result<Complaint, Error> {
        sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET close_requested = true,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COMPLAINT_COLUMNS}
            "#
        ))
        .bind(complaint_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn escalate_stale_complaints(&self, stale_before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE complaints
            SET status = 'escalated'::complaint_status,
                version = version + 1,
                updated_at = NOW()
            WHERE status IN ('pending'::complaint_status, 'in_progress'::complaint_status)
              AND updated_at < $1
            "#,
        )
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn add_resolution_note(
        &self,
        complaint_id: Uuid,
        author_id: Uuid,
        note_type: NoteType,
        message: String,
    ) -> Result<ResolutionNote, Error> {
        sqlx::query_as::<_, ResolutionNote>(INSERT_NOTE_SQL)
        .bind(complaint_id)
        .bind(author_id)
        .bind(note_type)
        .bind(message)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_resolution_notes(
        &self,
        complaint_id: Uuid,
        include_internal: bool,
    ) -> Result<Vec<ResolutionNote>, Error> {
        sqlx::query_as::<_, ResolutionNote>(
            r#"
            SELECT id, complaint_id, author_id, note_type, message, attachments, created_at
            FROM resolution_notes
            WHERE complaint_id = $1
              AND ($2 OR note_type != 'internal'::note_type)
            ORDER BY created_at ASC
            "#,
        )
        .bind(complaint_id)
        .bind(include_internal)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::lifecycle::{priority_rank, status_rank};

    fn highest_placeholder(sql: &str) -> usize {
        (1..)
            .take_while(|n| sql.contains(&format!("${}", n)))
            .last()
            .unwrap_or(0)
    }

    #[test]
    fn create_statement_binds_every_argument() {
        let sql = create_complaint_sql();

        // Nine bound arguments, attachments included
        assert_eq!(highest_placeholder(&sql), 9);
        assert!(sql.contains("attachments"));
    }

    #[test]
    fn list_statement_orders_by_triage_rank() {
        let sql = list_complaints_sql();

        for status in [
            ComplaintStatus::Pending,
            ComplaintStatus::InProgress,
            ComplaintStatus::Resolved,
            ComplaintStatus::Closed,
            ComplaintStatus::Escalated,
        ] {
            assert!(
                sql.contains(&format!("WHEN '{}' THEN {}", status.to_str(), status_rank(status))),
                "status {} not ranked",
                status.to_str()
            );
        }
        for priority in [
            ComplaintPriority::Critical,
            ComplaintPriority::Urgent,
            ComplaintPriority::Normal,
        ] {
            assert!(
                sql.contains(&format!(
                    "WHEN '{}' THEN {}",
                    priority.to_str(),
                    priority_rank(priority)
                )),
                "priority {} not ranked",
                priority.to_str()
            );
        }
        assert!(sql.contains("created_at DESC"));
    }

    #[test]
    fn status_update_is_version_conditioned() {
        let sql = update_status_sql();

        assert!(sql.contains("WHERE id = $1 AND version = $2"));
        assert_eq!(highest_placeholder(&sql), 4);
    }
}
