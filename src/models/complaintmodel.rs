use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "complaint_status", rename_all = "snake_case")]
pub enum ComplaintStatus {
    Pending,
    InProgress,
    Resolved,
    Closed,
    Escalated,
}

impl ComplaintStatus {
    pub fn to_str(&self) -> &str {
        match self {
            ComplaintStatus::Pending => "pending",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
            ComplaintStatus::Escalated => "escalated",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "complaint_priority", rename_all = "snake_case")]
pub enum ComplaintPriority {
    Normal,
    Urgent,
    Critical,
}

impl ComplaintPriority {
    pub fn to_str(&self) -> &str {
        match self {
            ComplaintPriority::Normal => "normal",
            ComplaintPriority::Urgent => "urgent",
            ComplaintPriority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "satisfaction", rename_all = "snake_case")]
pub enum Satisfaction {
    Satisfied,
    Unsatisfied,
}

impl Satisfaction {
    pub fn to_str(&self) -> &str {
        match self {
            Satisfaction::Satisfied => "satisfied",
            Satisfaction::Unsatisfied => "unsatisfied",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "complaint_category", rename_all = "snake_case")]
pub enum ComplaintCategory {
    Hostel,
    MentorBehavior,
    Curriculum,
    BatchManagement,
    LabInternet,
    Payment,
    Food,
    MentalHealth,
    Miscommunication,
    PersonalSafety,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Complaint {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name_cached: String,
    pub is_anonymous: bool,
    pub title: String,
    pub category: ComplaintCategory,
    // Free text when category = Other
    pub custom_category_text: Option<String>,
    pub description: String,
    pub priority: ComplaintPriority,
    pub status: ComplaintStatus,
    pub close_requested: bool,
    pub satisfaction: Option<Satisfaction>,
    pub attachments: Option<Vec<String>>,
    // Bumped on every mutation; admin status updates are conditioned on it
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "note_type", rename_all = "snake_case")]
pub enum NoteType {
    Public,
    Internal,
    ClarificationRequest,
    CloseRequest,
    FeedbackUnsatisfied,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResolutionNote {
    pub id: Uuid,
    pub complaint_id: Uuid,
    pub author_id: Uuid,
    pub note_type: NoteType,
    pub message: String,
    pub attachments: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ComplaintQueryParams {
    pub page: Option<i32>,
    pub limit: Option<i32>,
    pub status: Option<ComplaintStatus>,
    pub priority: Option<ComplaintPriority>,
    pub category: Option<ComplaintCategory>,
}
