use std::cmp::Ordering;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::complaintmodel::{Complaint, ComplaintPriority, ComplaintStatus};

fn critical_terms() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)harassment|mental|abuse").expect("hardcoded regex"))
}

fn urgent_terms() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)hostel|food|wifi|lab").expect("hardcoded regex"))
}

/// Classify a complaint description at submission time. Critical terms win
/// over urgent ones; the result is never re-evaluated later.
pub fn detect_priority(description: &str) -> ComplaintPriority {
    if critical_terms().is_match(description) {
        ComplaintPriority::Critical
    } else if urgent_terms().is_match(description) {
        ComplaintPriority::Urgent
    } else {
        ComplaintPriority::Normal
    }
}

/// Triage order: lower rank means more urgent.
pub fn status_rank(status: ComplaintStatus) -> u8 {
    match status {
        ComplaintStatus::Escalated => 0,
        ComplaintStatus::InProgress => 1,
        ComplaintStatus::Pending => 2,
        ComplaintStatus::Resolved => 3,
        ComplaintStatus::Closed => 4,
    }
}

pub fn priority_rank(priority: ComplaintPriority) -> u8 {
    match priority {
        ComplaintPriority::Critical => 0,
        ComplaintPriority::Urgent => 1,
        ComplaintPriority::Normal => 2,
    }
}

/// Reference semantics for the admin list ordering; the list query in
/// `complaintdb` carries the same ranks in its ORDER BY so the order holds
/// across pages.
pub fn triage_order(a: &Complaint, b: &Complaint) -> Ordering {
    status_rank(a.status)
        .cmp(&status_rank(b.status))
        .then(priority_rank(a.priority).cmp(&priority_rank(b.priority)))
        .then(b.created_at.cmp(&a.created_at))
}

pub fn sort_for_triage(complaints: &mut [Complaint]) {
    complaints.sort_by(triage_order);
}

/// Admin status changes follow the documented state machine. Leaving
/// Resolved or Closed is reserved for the student reopen paths.
pub fn admin_transition_allowed(from: ComplaintStatus, to: ComplaintStatus) -> bool {
    match from {
        ComplaintStatus::Pending | ComplaintStatus::InProgress | ComplaintStatus::Escalated => true,
        ComplaintStatus::Resolved => matches!(
            to,
            ComplaintStatus::Resolved | ComplaintStatus::Closed
        ),
        ComplaintStatus::Closed => to == ComplaintStatus::Closed,
    }
}

pub fn can_reopen(status: ComplaintStatus) -> bool {
    matches!(status, ComplaintStatus::Resolved | ComplaintStatus::Closed)
}

pub fn can_set_satisfaction(complaint: &Complaint) -> bool {
    matches!(
        complaint.status,
        ComplaintStatus::Resolved | ComplaintStatus::Closed
    ) && complaint.satisfaction.is_none()
}

pub fn can_request_close(complaint: &Complaint) -> bool {
    !complaint.close_requested
        && matches!(
            complaint.status,
            ComplaintStatus::Pending | ComplaintStatus::InProgress | ComplaintStatus::Resolved
        )
}

/// Reference semantics for an admin status update; the SQL UPDATE in
/// `complaintdb` mirrors this exactly.
pub fn apply_status_change(
    complaint: &mut Complaint,
    status: ComplaintStatus,
    priority: ComplaintPriority,
    now: DateTime<Utc>,
) {
    complaint.status = status;
    complaint.priority = priority;
    complaint.closed_at = if status == ComplaintStatus::Closed {
        Some(now)
    } else {
        None
    };
    complaint.version += 1;
    complaint.updated_at = now;
}

/// Reference semantics for a student reopen; mirrored by `reopen_complaint`.
pub fn apply_reopen(complaint: &mut Complaint, now: DateTime<Utc>) {
    complaint.status = ComplaintStatus::InProgress;
    complaint.satisfaction = None;
    complaint.close_requested = false;
    complaint.closed_at = None;
    complaint.version += 1;
    complaint.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::complaintmodel::{ComplaintCategory, Satisfaction};
    use chrono::Duration;
    use uuid::Uuid;

    fn complaint(status: ComplaintStatus, priority: ComplaintPriority) -> Complaint {
        let now = Utc::now();
        Complaint {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            student_name_cached: "Test Student".to_string(),
            is_anonymous: false,
            title: "Test complaint".to_string(),
            category: ComplaintCategory::Other,
            custom_category_text: None,
            description: "Something went wrong".to_string(),
            priority,
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

    #[test]
    fn detects_critical_priority() {
        assert_eq!(
            detect_priority("I was harassed by my mentor"),
            ComplaintPriority::Critical
        );
        assert_eq!(
            detect_priority("ABUSE in the common area"),
            ComplaintPriority::Critical
        );
        assert_eq!(
            detect_priority("my Mental health is suffering"),
            ComplaintPriority::Critical
        );
    }

    #[test]
    fn detects_urgent_priority() {
        assert_eq!(
            detect_priority("wifi in the hostel is down"),
            ComplaintPriority::Urgent
        );
        assert_eq!(
            detect_priority("the FOOD quality dropped"),
            ComplaintPriority::Urgent
        );
    }

    #[test]
    fn defaults_to_normal_priority() {
        assert_eq!(
            detect_priority("the course schedule was unclear"),
            ComplaintPriority::Normal
        );
    }

    #[test]
    fn critical_wins_over_urgent() {
        assert_eq!(
            detect_priority("harassment in the hostel mess"),
            ComplaintPriority::Critical
        );
    }

    #[test]
    fn triage_sort_orders_statuses() {
        let mut list = vec![
            complaint(ComplaintStatus::Closed, ComplaintPriority::Critical),
            complaint(ComplaintStatus::Pending, ComplaintPriority::Normal),
            complaint(ComplaintStatus::Escalated, ComplaintPriority::Normal),
            complaint(ComplaintStatus::Resolved, ComplaintPriority::Urgent),
            complaint(ComplaintStatus::InProgress, ComplaintPriority::Normal),
        ];
        sort_for_triage(&mut list);

        let statuses: Vec<ComplaintStatus> = list.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                ComplaintStatus::Escalated,
                ComplaintStatus::InProgress,
                ComplaintStatus::Pending,
                ComplaintStatus::Resolved,
                ComplaintStatus::Closed,
            ]
        );
    }

    #[test]
    fn triage_sort_breaks_status_ties_by_priority_then_recency() {
        let older = {
            let mut c = complaint(ComplaintStatus::Pending, ComplaintPriority::Normal);
            c.created_at = Utc::now() - Duration::hours(2);
            c
        };
        let newer = complaint(ComplaintStatus::Pending, ComplaintPriority::Normal);
        let critical = complaint(ComplaintStatus::Pending, ComplaintPriority::Critical);

        let mut list = vec![older.clone(), newer.clone(), critical.clone()];
        sort_for_triage(&mut list);

        assert_eq!(list[0].id, critical.id);
        assert_eq!(list[1].id, newer.id);
        assert_eq!(list[2].id, older.id);
    }

    #[test]
    fn admin_may_move_active_complaints_anywhere() {
        for from in [
            ComplaintStatus::Pending,
            ComplaintStatus::InProgress,
            ComplaintStatus::Escalated,
        ] {
            for to in [
                ComplaintStatus::Pending,
                ComplaintStatus::InProgress,
                ComplaintStatus::Resolved,
                ComplaintStatus::Closed,
                ComplaintStatus::Escalated,
            ] {
                assert!(admin_transition_allowed(from, to));
            }
        }
    }

    #[test]
    fn leaving_resolved_or_closed_requires_student_action() {
        assert!(admin_transition_allowed(
            ComplaintStatus::Resolved,
            ComplaintStatus::Closed
        ));
        assert!(!admin_transition_allowed(
            ComplaintStatus::Resolved,
            ComplaintStatus::InProgress
        ));
        assert!(!admin_transition_allowed(
            ComplaintStatus::Closed,
            ComplaintStatus::Pending
        ));
        assert!(!admin_transition_allowed(
            ComplaintStatus::Closed,
            ComplaintStatus::Resolved
        ));
    }

    #[test]
    fn closing_stamps_closed_at_and_leaving_clears_it() {
        let mut c = complaint(ComplaintStatus::InProgress, ComplaintPriority::Normal);
        let now = Utc::now();

        let priority = c.priority;
        apply_status_change(&mut c, ComplaintStatus::Closed, priority, now);
        assert_eq!(c.closed_at, Some(now));
        assert_eq!(c.version, 2);

        let later = now + Duration::minutes(5);
        apply_reopen(&mut c, later);
        assert_eq!(c.status, ComplaintStatus::InProgress);
        assert!(c.closed_at.is_none());
        assert_eq!(c.version, 3);
    }

    #[test]
    fn reopen_resets_satisfaction_and_close_request() {
        let mut c = complaint(ComplaintStatus::Resolved, ComplaintPriority::Urgent);
        c.satisfaction = Some(Satisfaction::Satisfied);
        c.close_requested = true;

        apply_reopen(&mut c, Utc::now());

        assert_eq!(c.status, ComplaintStatus::InProgress);
        assert!(c.satisfaction.is_none());
        assert!(!c.close_requested);
    }

    #[test]
    fn satisfaction_gate_requires_terminal_status_and_no_prior_verdict() {
        let mut resolved = complaint(ComplaintStatus::Resolved, ComplaintPriority::Normal);
        assert!(can_set_satisfaction(&resolved));

        resolved.satisfaction = Some(Satisfaction::Unsatisfied);
        assert!(!can_set_satisfaction(&resolved));

        let pending = complaint(ComplaintStatus::Pending, ComplaintPriority::Normal);
        assert!(!can_set_satisfaction(&pending));
    }

    #[test]
    fn close_request_gate() {
        let mut c = complaint(ComplaintStatus::Resolved, ComplaintPriority::Normal);
        assert!(can_request_close(&c));

        c.close_requested = true;
        assert!(!can_request_close(&c));

        let closed = complaint(ComplaintStatus::Closed, ComplaintPriority::Normal);
        assert!(!can_request_close(&closed));
    }
}
