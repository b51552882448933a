//! Task data structure and related functionality.
//!
//! This module defines the `Task` mirrored from the backend, its comments and
//! deadline, the `TaskDraft` used by create/edit forms, and the list filter.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Invalid, WorkflowError};
use crate::fields::*;
use crate::user::User;

/// Deadline expressed as a magnitude and a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    pub amount: u32,
    pub unit: DeadlineUnit,
}

impl Deadline {
    pub fn days(amount: u32) -> Self {
        Deadline { amount, unit: DeadlineUnit::Days }
    }

    pub fn hours(amount: u32) -> Self {
        Deadline { amount, unit: DeadlineUnit::Hours }
    }

    /// `start` plus this deadline, or `None` past the representable range.
    pub fn after(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_add_signed(self.as_duration())
    }

    pub fn as_duration(&self) -> Duration {
        match self.unit {
            DeadlineUnit::Days => Duration::days(i64::from(self.amount)),
            DeadlineUnit::Hours => Duration::hours(i64::from(self.amount)),
        }
    }
}

/// A comment attached to a task. Append-only from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A unit of work with one responsible user and optional participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Status,
    pub responsible_id: String,
    #[serde(default)]
    pub participants: Vec<String>,
    pub start: DateTime<Utc>,
    pub deadline: Deadline,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Task {
    /// Delivery time, always derived from the start and the deadline.
    /// Saturates at the latest representable time.
    pub fn delivery_at(&self) -> DateTime<Utc> {
        self.deadline.after(self.start).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Overlay a backend reply on the task already known locally.
    ///
    /// Replies often carry only some fields: empty text, people and comments
    /// are taken from `known`, and so are the schedule and creation time.
    pub fn merged_over(self, known: &Task) -> Task {
        fn or_known(reply: String, known: &str) -> String {
            if reply.trim().is_empty() {
                known.to_string()
            } else {
                reply
            }
        }
        Task {
            title: or_known(self.title, &known.title),
            description: or_known(self.description, &known.description),
            responsible_id: or_known(self.responsible_id, &known.responsible_id),
            participants: if self.participants.is_empty() {
                known.participants.clone()
            } else {
                self.participants
            },
            comments: if self.comments.is_empty() {
                known.comments.clone()
            } else {
                self.comments
            },
            start: known.start,
            deadline: known.deadline,
            created_at: known.created_at,
            closed_at: self.closed_at.or(known.closed_at),
            ..self
        }
    }

    /// Whether the user is the responsible or a listed participant.
    pub fn is_member(&self, user_id: &str) -> bool {
        self.responsible_id == user_id || self.participants.iter().any(|p| p == user_id)
    }

    /// Overdue either by status or because the delivery time has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            Status::Overdue => true,
            Status::Done | Status::Closed => false,
            _ => self.delivery_at() < now,
        }
    }

    /// Open task due within the next 24 hours.
    pub fn is_near_deadline(&self, now: DateTime<Utc>) -> bool {
        if matches!(self.status, Status::Done | Status::Closed | Status::Overdue) {
            return false;
        }
        let delivery = self.delivery_at();
        delivery >= now && delivery - now <= Duration::hours(24)
    }
}

/// Fields of the create/edit task form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub deadline: Deadline,
    pub responsible_id: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

impl TaskDraft {
    /// Reject the form before any backend call.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.title.trim().is_empty() {
            return Err(WorkflowError::Validation(Invalid::MissingTitle));
        }
        if self.responsible_id.trim().is_empty() {
            return Err(WorkflowError::Validation(Invalid::MissingResponsible));
        }
        if self.deadline.amount == 0 || self.deadline.after(self.start).is_none() {
            return Err(WorkflowError::Validation(Invalid::InvalidDeadline));
        }
        Ok(())
    }

    /// Delivery preview shown while the form is being filled.
    pub fn delivery_preview(&self) -> DateTime<Utc> {
        self.deadline.after(self.start).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The task this draft describes, before the backend has answered.
    pub fn to_task(&self, id: &str, now: DateTime<Utc>) -> Task {
        Task {
            id: id.to_string(),
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            status: Status::Pending,
            responsible_id: self.responsible_id.clone(),
            participants: self.participants.clone(),
            start: self.start,
            deadline: self.deadline,
            created_at: now,
            updated_at: now,
            closed_at: None,
            comments: Vec::new(),
        }
    }

    /// Prefill a draft from an existing task for editing.
    pub fn from_task(task: &Task) -> Self {
        TaskDraft {
            title: task.title.clone(),
            description: task.description.clone(),
            start: task.start,
            deadline: task.deadline,
            responsible_id: task.responsible_id.clone(),
            participants: task.participants.clone(),
        }
    }
}

/// Search and status filter for task lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub search: Option<String>,
    pub status: Option<Status>,
}

impl TaskFilter {
    /// Apply the filter, scoping employees to tasks they are members of.
    pub fn apply<'a>(&self, tasks: &'a [Task], viewer: &User) -> Vec<&'a Task> {
        let needle = self.search.as_ref().map(|s| s.to_lowercase());
        tasks
            .iter()
            .filter(|t| viewer.role == Role::Admin || t.is_member(&viewer.id))
            .filter(|t| self.status.map_or(true, |s| t.status == s))
            .filter(|t| {
                needle
                    .as_ref()
                    .map_or(true, |n| t.title.to_lowercase().contains(n.as_str()))
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;

    use super::*;

    pub fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, h, 0, 0).unwrap()
    }

    pub fn task(id: &str, status: Status, responsible: &str) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            description: String::new(),
            status,
            responsible_id: responsible.to_string(),
            participants: Vec::new(),
            start: at(8),
            deadline: Deadline::days(2),
            created_at: at(8),
            updated_at: at(8),
            closed_at: None,
            comments: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::user::fixtures::{admin, employee};

    #[test]
    fn delivery_is_start_plus_deadline() {
        let mut t = task("1", Status::Pending, "e1");
        assert_eq!(t.delivery_at(), at(8) + Duration::days(2));
        t.deadline = Deadline::hours(5);
        assert_eq!(t.delivery_at(), at(13));
    }

    #[test]
    fn participants_are_members() {
        let mut t = task("1", Status::Pending, "e1");
        t.participants.push("e2".into());
        assert!(t.is_member("e1"));
        assert!(t.is_member("e2"));
        assert!(!t.is_member("e3"));
    }

    #[test]
    fn near_deadline_and_overdue_flags() {
        let mut t = task("1", Status::InProgress, "e1");
        t.deadline = Deadline::hours(10);
        assert!(t.is_near_deadline(at(9)));
        assert!(!t.is_overdue(at(9)));
        assert!(t.is_overdue(at(19)));
        t.status = Status::Done;
        assert!(!t.is_overdue(at(19)));
    }

    #[test]
    fn draft_validation() {
        let mut draft = TaskDraft::from_task(&task("1", Status::Pending, "e1"));
        assert!(draft.validate().is_ok());
        draft.responsible_id.clear();
        assert_eq!(draft.validate(), Err(WorkflowError::Validation(Invalid::MissingResponsible)));
        draft.title = "  ".into();
        assert_eq!(draft.validate(), Err(WorkflowError::Validation(Invalid::MissingTitle)));
    }

    #[test]
    fn huge_deadlines_are_refused_and_never_panic() {
        let mut t = task("1", Status::InProgress, "e1");
        t.deadline = Deadline::days(u32::MAX);
        assert_eq!(t.delivery_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!t.is_overdue(at(9)));
        assert!(!t.is_near_deadline(at(9)));

        let draft = TaskDraft::from_task(&t);
        assert_eq!(draft.validate(), Err(WorkflowError::Validation(Invalid::InvalidDeadline)));
        assert_eq!(draft.delivery_preview(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn partial_reply_keeps_what_it_does_not_carry() {
        let mut known = task("1", Status::InProgress, "e1");
        known.participants.push("e2".into());
        known.comments.push(Comment {
            id: "c1".into(),
            author: "User e1".into(),
            text: "on it".into(),
            created_at: at(9),
        });

        let mut reply = task("1", Status::Done, "");
        reply.title.clear();
        reply.start = at(11);
        reply.closed_at = Some(at(12));

        let merged = reply.merged_over(&known);
        assert_eq!(merged.status, Status::Done);
        assert_eq!(merged.closed_at, Some(at(12)));
        assert_eq!(merged.title, "Task 1");
        assert_eq!(merged.responsible_id, "e1");
        assert_eq!(merged.participants, vec!["e2".to_string()]);
        assert_eq!(merged.comments.len(), 1);
        assert_eq!(merged.start, at(8));
    }

    #[test]
    fn employees_only_see_their_tasks() {
        let tasks = vec![
            task("1", Status::Pending, "e1"),
            task("2", Status::Done, "e2"),
            task("3", Status::Pending, "e2"),
        ];
        let filter = TaskFilter::default();
        assert_eq!(filter.apply(&tasks, &employee("e1")).len(), 1);
        assert_eq!(filter.apply(&tasks, &admin("a1")).len(), 3);

        let filter = TaskFilter { search: Some("task 3".into()), status: Some(Status::Pending) };
        let found = filter.apply(&tasks, &admin("a1"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "3");
    }
}
