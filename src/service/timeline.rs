use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::complaintmodel::{Complaint, ComplaintStatus, NoteType, ResolutionNote};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimelineIcon {
    Pin,
    Clock,
    Message,
    Check,
    Reopen,
    Escalate,
}

/// One row of the case timeline. `timestamp` is `None` for the inactive
/// placeholder entries of stages the complaint has not reached yet.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelineEvent {
    pub icon: TimelineIcon,
    pub title: String,
    pub description: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Linearize a complaint and its notes into the shared case timeline.
/// Pure projection: the same snapshot always yields the same list.
/// Internal notes never appear.
pub fn project(complaint: &Complaint, notes: &[ResolutionNote]) -> Vec<TimelineEvent> {
    let mut events = vec![TimelineEvent {
        icon: TimelineIcon::Pin,
        title: "Complaint Submitted".to_string(),
        description: Some(complaint.description.clone()),
        timestamp: Some(complaint.created_at),
        is_active: true,
    }];

    if complaint.status != ComplaintStatus::Pending {
        events.push(TimelineEvent {
            icon: TimelineIcon::Clock,
            title: "Status changed to \"In Progress\"".to_string(),
            description: None,
            timestamp: Some(complaint.updated_at),
            is_active: true,
        });
    }

    if complaint.status == ComplaintStatus::Escalated {
        events.push(TimelineEvent {
            icon: TimelineIcon::Escalate,
            title: "Complaint Escalated".to_string(),
            description: Some(
                "This complaint has been escalated due to extended processing time.".to_string(),
            ),
            timestamp: Some(complaint.updated_at),
            is_active: true,
        });
    }

    for note in notes {
        let title = match note.note_type {
            NoteType::Internal => continue,
            NoteType::ClarificationRequest => "Clarification Requested",
            NoteType::CloseRequest => "Close Request Sent",
            NoteType::FeedbackUnsatisfied => "Student reported not satisfied",
            NoteType::Public => "Admin replied",
        };
        events.push(TimelineEvent {
            icon: TimelineIcon::Message,
            title: title.to_string(),
            description: Some(note.message.clone()),
            timestamp: Some(note.created_at),
            is_active: true,
        });
    }

    if complaint.status == ComplaintStatus::Resolved {
        events.push(TimelineEvent {
            icon: TimelineIcon::Check,
            title: "Status changed to \"Resolved\"".to_string(),
            description: None,
            timestamp: Some(complaint.updated_at),
            is_active: true,
        });
    }

    if complaint.status == ComplaintStatus::Closed {
        events.push(TimelineEvent {
            icon: TimelineIcon::Check,
            title: "Status changed to \"Closed\"".to_string(),
            description: complaint
                .satisfaction
                .map(|s| format!("Student marked as: {}", s.to_str())),
            timestamp: complaint.closed_at.or(Some(complaint.updated_at)),
            is_active: true,
        });
    }

    // Placeholders for stages not yet reached
    match complaint.status {
        ComplaintStatus::Pending | ComplaintStatus::InProgress | ComplaintStatus::Escalated => {
            events.push(placeholder("Resolved"));
            events.push(placeholder("Closed"));
        }
        ComplaintStatus::Resolved => {
            events.push(placeholder("Closed"));
        }
        ComplaintStatus::Closed => {}
    }

    events
}

fn placeholder(title: &str) -> TimelineEvent {
    TimelineEvent {
        icon: TimelineIcon::Check,
        title: title.to_string(),
        description: None,
        timestamp: None,
        is_active: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::complaintmodel::{
        ComplaintCategory, ComplaintPriority, Satisfaction,
    };
    use uuid::Uuid;

    fn complaint(status: ComplaintStatus) -> Complaint {
        let now = Utc::now();
        Complaint {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            student_name_cached: "Test Student".to_string(),
            is_anonymous: false,
            title: "Wifi down".to_string(),
            category: ComplaintCategory::LabInternet,
            custom_category_text: None,
            description: "The lab wifi has been down for a week".to_string(),
            priority: ComplaintPriority::Urgent,
            status,
            close_requested: false,
            satisfaction: None,
            attachments: None,
            version: 1,
            created_at: now,
            updated_at: now,
            closed_at: if status == ComplaintStatus::Closed {
                Some(now)
            } else {
                None
            },
        }
    }

    fn note(complaint_id: Uuid, note_type: NoteType, message: &str) -> ResolutionNote {
        ResolutionNote {
            id: Uuid::new_v4(),
            complaint_id,
            author_id: Uuid::new_v4(),
            note_type,
            message: message.to_string(),
            attachments: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pending_complaint_has_submission_and_placeholders() {
        let c = complaint(ComplaintStatus::Pending);
        let events = project(&c, &[]);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].icon, TimelineIcon::Pin);
        assert!(events[0].is_active);
        assert!(!events[1].is_active);
        assert!(events[1].timestamp.is_none());
        assert_eq!(events[1].title, "Resolved");
        assert_eq!(events[2].title, "Closed");
    }

    #[test]
    fn internal_notes_are_excluded() {
        let c = complaint(ComplaintStatus::InProgress);
        let notes = vec![
            note(c.id, NoteType::Public, "We are on it"),
            note(c.id, NoteType::Internal, "student seems agitated"),
            note(c.id, NoteType::CloseRequest, "Please close"),
        ];
        let events = project(&c, &notes);

        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert!(titles.contains(&"Admin replied"));
        assert!(titles.contains(&"Close Request Sent"));
        assert!(!events
            .iter()
            .any(|e| e.description.as_deref() == Some("student seems agitated")));
    }

    #[test]
    fn closed_complaint_carries_satisfaction_verdict() {
        let mut c = complaint(ComplaintStatus::Closed);
        c.satisfaction = Some(Satisfaction::Satisfied);
        let events = project(&c, &[]);

        let closed = events
            .iter()
            .find(|e| e.title == "Status changed to \"Closed\"")
            .expect("closed marker present");
        assert_eq!(
            closed.description.as_deref(),
            Some("Student marked as: satisfied")
        );
        // No placeholders once closed
        assert!(events.iter().all(|e| e.is_active));
    }

    #[test]
    fn projection_is_deterministic() {
        let c = complaint(ComplaintStatus::Resolved);
        let notes = vec![note(c.id, NoteType::Public, "Fixed the router")];

        assert_eq!(project(&c, &notes), project(&c, &notes));
    }
}
