//! Client-side cache of the last backend responses.
//!
//! [`AppState`] is a snapshot: every [`Mutation`] produces a new snapshot and
//! leaves the old one untouched. Optimistic updates go through [`Pending`],
//! which keeps the snapshot taken before the provisional change so it can be
//! committed with the backend's answer or reverted on failure.

use chrono::{DateTime, Utc};

use crate::fields::Status;
use crate::task::{Comment, Task, TaskFilter};
use crate::user::User;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub user: Option<User>,
    pub tasks: Vec<Task>,
    pub users: Vec<User>,
}

/// The only ways the cache changes.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    SignedIn(User),
    SignedOut,
    TasksLoaded(Vec<Task>),
    UsersLoaded(Vec<User>),
    /// Insert or replace by id.
    TaskUpserted(Task),
    TaskRemoved(String),
    StatusChanged {
        task_id: String,
        status: Status,
        at: DateTime<Utc>,
        closed_at: Option<DateTime<Utc>>,
    },
    CommentAdded {
        task_id: String,
        comment: Comment,
    },
    UserUpserted(User),
    UserRemoved(String),
}

impl AppState {
    /// Produce the snapshot that follows `mutation`.
    pub fn apply(&self, mutation: Mutation) -> AppState {
        let mut next = self.clone();
        match mutation {
            Mutation::SignedIn(user) => next.user = Some(user),
            Mutation::SignedOut => next = AppState::default(),
            Mutation::TasksLoaded(tasks) => next.tasks = tasks,
            Mutation::UsersLoaded(users) => next.users = users,
            Mutation::TaskUpserted(task) => match next.tasks.iter_mut().find(|t| t.id == task.id) {
                Some(slot) => *slot = task,
                None => next.tasks.push(task),
            },
            Mutation::TaskRemoved(id) => next.tasks.retain(|t| t.id != id),
            Mutation::StatusChanged { task_id, status, at, closed_at } => {
                if let Some(task) = next.tasks.iter_mut().find(|t| t.id == task_id) {
                    task.status = status;
                    task.updated_at = at;
                    if closed_at.is_some() {
                        task.closed_at = closed_at;
                    }
                }
            }
            Mutation::CommentAdded { task_id, comment } => {
                if let Some(task) = next.tasks.iter_mut().find(|t| t.id == task_id) {
                    task.comments.push(comment);
                }
            }
            Mutation::UserUpserted(user) => {
                if next.user.as_ref().map_or(false, |u| u.id == user.id) {
                    next.user = Some(user.clone());
                }
                match next.users.iter_mut().find(|u| u.id == user.id) {
                    Some(slot) => *slot = user,
                    None => next.users.push(user),
                }
            }
            Mutation::UserRemoved(id) => next.users.retain(|u| u.id != id),
        }
        next
    }

    /// Apply `mutation` provisionally.
    pub fn begin(&self, mutation: Mutation) -> Pending {
        Pending {
            before: self.clone(),
            provisional: self.apply(mutation),
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn find_user(&self, id: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .or_else(|| self.user.as_ref().filter(|u| u.id == id))
    }

    /// Display name for a user id, falling back to the id itself.
    pub fn user_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.find_user(id).map_or(id, |u| u.name.as_str())
    }

    pub fn admins(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| u.is_admin())
    }

    /// Tasks the signed-in user may see, after search and status filters.
    pub fn visible_tasks(&self, filter: &TaskFilter) -> Vec<&Task> {
        match &self.user {
            Some(viewer) => filter.apply(&self.tasks, viewer),
            None => Vec::new(),
        }
    }
}

/// A provisional snapshot awaiting the backend's answer.
#[derive(Debug, Clone)]
pub struct Pending {
    before: AppState,
    provisional: AppState,
}

impl Pending {
    /// What the UI shows while the call is in flight.
    pub fn provisional(&self) -> &AppState {
        &self.provisional
    }

    /// Keep the change, replacing it with the authoritative result if any.
    pub fn commit(self, authoritative: Option<Mutation>) -> AppState {
        match authoritative {
            Some(mutation) => self.provisional.apply(mutation),
            None => self.provisional,
        }
    }

    /// Drop the change.
    pub fn revert(self) -> AppState {
        self.before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::fixtures::{at, task};
    use crate::user::fixtures::{admin, employee};

    fn loaded() -> AppState {
        AppState::default()
            .apply(Mutation::SignedIn(admin("a1")))
            .apply(Mutation::TasksLoaded(vec![
                task("t1", Status::Pending, "e1"),
                task("t2", Status::Done, "e2"),
            ]))
    }

    #[test]
    fn apply_leaves_the_previous_snapshot_alone() {
        let before = loaded();
        let after = before.apply(Mutation::TaskRemoved("t1".into()));
        assert_eq!(before.tasks.len(), 2);
        assert_eq!(after.tasks.len(), 1);
    }

    #[test]
    fn upsert_replaces_or_appends() {
        let mut edited = task("t1", Status::Pending, "e1");
        edited.title = "Renamed".into();
        let state = loaded()
            .apply(Mutation::TaskUpserted(edited))
            .apply(Mutation::TaskUpserted(task("t3", Status::Pending, "e1")));
        assert_eq!(state.tasks.len(), 3);
        assert_eq!(state.task("t1").unwrap().title, "Renamed");
    }

    #[test]
    fn status_change_keeps_close_stamp_unless_given() {
        let state = loaded().apply(Mutation::StatusChanged {
            task_id: "t1".into(),
            status: Status::Done,
            at: at(10),
            closed_at: Some(at(10)),
        });
        let state = state.apply(Mutation::StatusChanged {
            task_id: "t1".into(),
            status: Status::Closed,
            at: at(11),
            closed_at: None,
        });
        let t = state.task("t1").unwrap();
        assert_eq!(t.status, Status::Closed);
        assert_eq!(t.updated_at, at(11));
        assert_eq!(t.closed_at, Some(at(10)));
    }

    #[test]
    fn pending_revert_restores_and_commit_replaces() {
        let state = loaded();
        let pending = state.begin(Mutation::TaskRemoved("t1".into()));
        assert!(pending.provisional().task("t1").is_none());
        assert_eq!(pending.clone().revert(), state);

        let mut server_copy = task("t2", Status::Closed, "e2");
        server_copy.title = "From server".into();
        let committed = pending.commit(Some(Mutation::TaskUpserted(server_copy)));
        assert!(committed.task("t1").is_none());
        assert_eq!(committed.task("t2").unwrap().title, "From server");
    }

    #[test]
    fn signed_out_clears_everything() {
        assert_eq!(loaded().apply(Mutation::SignedOut), AppState::default());
    }

    #[test]
    fn user_names_fall_back_to_ids() {
        let state = loaded().apply(Mutation::UsersLoaded(vec![employee("e1")]));
        assert_eq!(state.user_name("e1"), "User e1");
        assert_eq!(state.user_name("a1"), "User a1");
        assert_eq!(state.user_name("zz"), "zz");
    }
}
