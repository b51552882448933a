//! System activity feed.
//!
//! The feed is a bounded audit trail kept newest first. A record is dropped
//! when one with the same `(user, kind, entity, from, to)` already exists; the
//! timestamp is not part of that key, so a repeated identical event collapses
//! into the first one. The feed is echoed to a local JSON file for fast
//! reloads, but the file is a cache and may be discarded at any time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::fields::{ActivityKind, Language, Role, Status};
use crate::local;
use crate::task::Task;
use crate::user::User;

/// How many records the feed keeps.
pub const ACTIVITY_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemActivity {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub kind: ActivityKind,
    pub entity_type: String,
    pub entity_id: String,
    pub entity_title: Option<String>,
    pub from_status: Option<Status>,
    pub to_status: Option<Status>,
    pub created_at: DateTime<Utc>,
}

impl SystemActivity {
    pub fn summary(&self, lang: Language) -> String {
        describe(
            self.kind,
            self.entity_title.as_deref().unwrap_or(&self.entity_id),
            self.from_status,
            self.to_status,
            lang,
        )
    }
}

fn describe(kind: ActivityKind, subject: &str, from: Option<Status>, to: Option<Status>, lang: Language) -> String {
    let statuses = || format!("{} → {}", from.map_or("-", Status::as_str), to.map_or("-", Status::as_str));
    match (lang, kind) {
        (Language::En, ActivityKind::Created) => format!("Created task: {subject}"),
        (Language::En, ActivityKind::Updated) => format!("Updated task: {subject}"),
        (Language::En, ActivityKind::Deleted) => format!("Deleted task: {subject}"),
        (Language::En, ActivityKind::StatusChanged) => format!("Changed status: {subject} ({})", statuses()),
        (Language::En, ActivityKind::Commented) => format!("Commented on task: {subject}"),
        (Language::En, ActivityKind::Other) => format!("Activity: {subject}"),
        (Language::Pt, ActivityKind::Created) => format!("Criou tarefa: {subject}"),
        (Language::Pt, ActivityKind::Updated) => format!("Atualizou tarefa: {subject}"),
        (Language::Pt, ActivityKind::Deleted) => format!("Eliminou tarefa: {subject}"),
        (Language::Pt, ActivityKind::StatusChanged) => format!("Mudou estado: {subject} ({})", statuses()),
        (Language::Pt, ActivityKind::Commented) => format!("Comentou na tarefa: {subject}"),
        (Language::Pt, ActivityKind::Other) => format!("Atividade: {subject}"),
    }
}

/// An activity before it is accepted into the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDraft {
    pub user_id: String,
    pub user_name: String,
    pub kind: ActivityKind,
    pub entity_type: String,
    pub entity_id: String,
    pub entity_title: Option<String>,
    pub from_status: Option<Status>,
    pub to_status: Option<Status>,
}

impl ActivityDraft {
    /// An event on a task by `actor`.
    pub fn on_task(actor: &User, kind: ActivityKind, task_id: &str, title: Option<&str>) -> Self {
        ActivityDraft {
            user_id: actor.id.clone(),
            user_name: actor.name.clone(),
            kind,
            entity_type: "task".to_string(),
            entity_id: task_id.to_string(),
            entity_title: title.map(str::to_string),
            from_status: None,
            to_status: None,
        }
    }

    pub fn with_statuses(mut self, from: Status, to: Status) -> Self {
        self.from_status = Some(from);
        self.to_status = Some(to);
        self
    }

    /// One-line description sent to administrators.
    pub fn summary(&self, lang: Language) -> String {
        describe(
            self.kind,
            self.entity_title.as_deref().unwrap_or(&self.entity_id),
            self.from_status,
            self.to_status,
            lang,
        )
    }

    fn same_event(&self, other: &SystemActivity) -> bool {
        self.user_id == other.user_id
            && self.kind == other.kind
            && self.entity_id == other.entity_id
            && self.from_status == other.from_status
            && self.to_status == other.to_status
    }
}

/// Newest-first, deduplicated, capped activity list.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    items: Vec<SystemActivity>,
}

impl ActivityLog {
    /// Start from a previously echoed list, re-applying the cap.
    pub fn from_entries(mut items: Vec<SystemActivity>) -> Self {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(ACTIVITY_LIMIT);
        ActivityLog { items }
    }

    /// Accept `draft` unless the same event is already in the feed.
    pub fn record(&mut self, draft: ActivityDraft, now: DateTime<Utc>) -> Option<&SystemActivity> {
        if self.items.iter().any(|a| draft.same_event(a)) {
            debug!(entity = %draft.entity_id, kind = ?draft.kind, "duplicate activity ignored");
            return None;
        }
        self.items.insert(
            0,
            SystemActivity {
                id: format!("A-{}", Uuid::new_v4().simple()),
                user_id: draft.user_id,
                user_name: draft.user_name,
                kind: draft.kind,
                entity_type: draft.entity_type,
                entity_id: draft.entity_id,
                entity_title: draft.entity_title,
                from_status: draft.from_status,
                to_status: draft.to_status,
                created_at: now,
            },
        );
        self.items.truncate(ACTIVITY_LIMIT);
        self.items.first()
    }

    pub fn entries(&self) -> &[SystemActivity] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Admins see everything; others only activities on tasks they belong to.
    pub fn visible_for<'a>(&'a self, viewer: &User, tasks: &[Task]) -> Vec<&'a SystemActivity> {
        if viewer.role == Role::Admin {
            return self.items.iter().collect();
        }
        let mine: Vec<&str> = tasks
            .iter()
            .filter(|t| t.is_member(&viewer.id))
            .map(|t| t.id.as_str())
            .collect();
        self.items
            .iter()
            .filter(|a| mine.contains(&a.entity_id.as_str()))
            .collect()
    }
}

/// Best-effort JSON echo of the activity feed.
#[derive(Debug, Clone)]
pub struct ActivityEcho {
    path: PathBuf,
}

impl ActivityEcho {
    pub fn new(data_dir: &Path) -> Self {
        ActivityEcho {
            path: data_dir.join("activities.json"),
        }
    }

    /// Load the echoed feed; a missing or unreadable file yields an empty one.
    pub fn load(&self) -> ActivityLog {
        match local::read_json::<Vec<SystemActivity>>(&self.path) {
            Ok(Some(items)) => ActivityLog::from_entries(items),
            Ok(None) => ActivityLog::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable activity echo");
                ActivityLog::default()
            }
        }
    }

    pub fn save(&self, log: &ActivityLog) {
        if let Err(e) = local::write_json_atomic(&self.path, &log.entries()) {
            warn!(path = %self.path.display(), error = %e, "could not write activity echo");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::task::fixtures::{at, task};
    use crate::user::fixtures::{admin, employee};

    fn status_change(user: &User, task_id: &str) -> ActivityDraft {
        ActivityDraft::on_task(user, ActivityKind::StatusChanged, task_id, Some("Report"))
            .with_statuses(Status::Pending, Status::InProgress)
    }

    #[test]
    fn identical_events_collapse_regardless_of_time() {
        let mut log = ActivityLog::default();
        let e = employee("e1");
        assert!(log.record(status_change(&e, "t1"), at(9)).is_some());
        assert!(log.record(status_change(&e, "t1"), at(15)).is_none());
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].created_at, at(9));
    }

    #[test]
    fn different_statuses_are_different_events() {
        let mut log = ActivityLog::default();
        let e = employee("e1");
        log.record(status_change(&e, "t1"), at(9));
        let back = ActivityDraft::on_task(&e, ActivityKind::StatusChanged, "t1", None)
            .with_statuses(Status::InProgress, Status::Pending);
        assert!(log.record(back, at(9)).is_some());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn feed_is_capped_and_evicts_oldest() {
        let mut log = ActivityLog::default();
        let e = employee("e1");
        for i in 0..(ACTIVITY_LIMIT + 25) {
            let draft = ActivityDraft::on_task(&e, ActivityKind::Updated, &format!("t{i}"), None);
            log.record(draft, at(0) + Duration::minutes(i as i64));
        }
        assert_eq!(log.len(), ACTIVITY_LIMIT);
        assert_eq!(log.entries()[0].entity_id, format!("t{}", ACTIVITY_LIMIT + 24));
        assert!(log.entries().iter().all(|a| a.entity_id != "t0"));
    }

    #[test]
    fn summaries_per_kind() {
        let a = admin("a1");
        let draft = status_change(&a, "t1");
        assert_eq!(draft.summary(Language::En), "Changed status: Report (PENDING → IN_PROGRESS)");
        let other = ActivityDraft::on_task(&a, ActivityKind::Other, "t7", None);
        assert_eq!(other.summary(Language::En), "Activity: t7");
        let created = ActivityDraft::on_task(&a, ActivityKind::Created, "t1", Some("Report"));
        assert_eq!(created.summary(Language::Pt), "Criou tarefa: Report");
    }

    #[test]
    fn employees_only_see_their_tasks_activity() {
        let mut log = ActivityLog::default();
        let a = admin("a1");
        log.record(ActivityDraft::on_task(&a, ActivityKind::Created, "t1", None), at(9));
        log.record(ActivityDraft::on_task(&a, ActivityKind::Created, "t2", None), at(9));
        let mut mine = task("t2", Status::Pending, "e9");
        mine.participants.push("e1".into());
        let tasks = vec![task("t1", Status::Pending, "e2"), mine];

        let visible = log.visible_for(&employee("e1"), &tasks);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].entity_id, "t2");
        assert_eq!(log.visible_for(&a, &tasks).len(), 2);
    }

    #[test]
    fn echo_round_trip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let echo = ActivityEcho::new(dir.path());
        assert!(echo.load().is_empty());

        let mut log = ActivityLog::default();
        log.record(status_change(&employee("e1"), "t1"), at(9));
        echo.save(&log);
        assert_eq!(echo.load().entries(), log.entries());

        std::fs::write(dir.path().join("activities.json"), "{not json").unwrap();
        assert!(echo.load().is_empty());
    }
}
