//! The signed-in session: every user-facing operation lives here.
//!
//! A [`Session`] owns the cached [`AppState`], the notification list and the
//! activity feed, and is the only place that talks to the [`Backend`]. Each
//! operation follows the same shape: refuse locally when a rule forbids it
//! (no side effects), otherwise call the backend, fold the answer into the
//! cache, then run the best-effort follow-ups (activity, notifications) whose
//! failures are logged and never surfaced.

use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity::{ActivityDraft, ActivityEcho, ActivityLog, SystemActivity};
use crate::backend::{Backend, PasswordChange, Registration, TaskScope, TokenCheck};
use crate::clock::Clock;
use crate::compose::{fallback_message, Composer, NotificationRequest, TemplateComposer};
use crate::error::{ApiError, ApiErrorKind, Invalid, WorkflowError};
use crate::fields::{ActivityKind, Language, Severity, Status};
use crate::local::TokenStore;
use crate::messages;
use crate::notify::{Notification, NotificationCenter};
use crate::state::{AppState, Mutation};
use crate::task::{Comment, Task, TaskDraft, TaskFilter};
use crate::user::{self, User, UserDraft};
use crate::workflow::{available_moves, plan_transition, Direction, Moves};

pub struct Session {
    backend: Arc<dyn Backend>,
    composer: Box<dyn Composer>,
    clock: Arc<dyn Clock>,
    language: Language,
    state: AppState,
    notifications: NotificationCenter,
    activities: ActivityLog,
    echo: Option<ActivityEcho>,
    tokens: Option<TokenStore>,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>) -> Self {
        Session {
            backend,
            composer: Box::new(TemplateComposer),
            clock,
            language: Language::default(),
            state: AppState::default(),
            notifications: NotificationCenter::default(),
            activities: ActivityLog::default(),
            echo: None,
            tokens: None,
        }
    }

    pub fn with_composer(mut self, composer: Box<dyn Composer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Deduplication windows for notifications.
    pub fn with_notification_windows(mut self, cooldown: Duration, recency: Duration) -> Self {
        self.notifications = NotificationCenter::new(cooldown, recency);
        self
    }

    /// Keep the auth token and the activity echo under `data_dir`.
    pub fn with_storage(mut self, data_dir: &Path) -> Self {
        let echo = ActivityEcho::new(data_dir);
        self.activities = echo.load();
        self.echo = Some(echo);
        self.tokens = Some(TokenStore::new(data_dir));
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn user(&self) -> Option<&User> {
        self.state.user.as_ref()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn activities(&self) -> &ActivityLog {
        &self.activities
    }

    /// Email of the last successful login, if one was remembered.
    pub fn remembered_email(&self) -> Option<String> {
        self.tokens.as_ref().and_then(TokenStore::remembered_email)
    }

    // ------------------------------------------------------------------
    // Small helpers
    // ------------------------------------------------------------------

    fn actor(&self) -> Result<User, WorkflowError> {
        self.state.user.clone().ok_or(WorkflowError::NotSignedIn)
    }

    fn admin(&self) -> Result<User, WorkflowError> {
        let actor = self.actor()?;
        if actor.is_admin() {
            Ok(actor)
        } else {
            Err(WorkflowError::AdminRequired)
        }
    }

    fn cached_task(&self, id: &str) -> Result<Task, WorkflowError> {
        self.state
            .task(id)
            .cloned()
            .ok_or_else(|| WorkflowError::TaskNotFound(id.to_string()))
    }

    fn toast(&mut self, user_id: &str, message: &str, severity: Severity) {
        let now = self.clock.now();
        self.notifications.notify(user_id, message, severity, now);
    }

    /// Tell the actor a backend call failed and hand the error back.
    fn fail(&mut self, actor: &User, err: ApiError, message: &str) -> WorkflowError {
        warn!(user = %actor.id, error = %err, "backend call failed");
        self.toast(&actor.id, message, Severity::Error);
        WorkflowError::Api(err)
    }

    fn admin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.admins().map(|u| u.id.clone()).collect();
        if let Some(me) = self.state.user.as_ref().filter(|u| u.is_admin()) {
            if !ids.contains(&me.id) {
                ids.push(me.id.clone());
            }
        }
        ids
    }

    /// Record an activity; accepted ones are echoed and summarised to admins.
    fn record(&mut self, draft: ActivityDraft) {
        let summary = draft.summary(self.language);
        let now = self.clock.now();
        if self.activities.record(draft, now).is_none() {
            return;
        }
        if let Some(echo) = &self.echo {
            echo.save(&self.activities);
        }
        for admin in self.admin_ids() {
            self.notifications.notify(&admin, &summary, Severity::Info, now);
        }
    }

    fn notify_admins(&mut self, message: &str) {
        let now = self.clock.now();
        for admin in self.admin_ids() {
            self.notifications.notify(&admin, message, Severity::Info, now);
        }
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    /// Sign in and load the data the user can see.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<User, WorkflowError> {
        user::validate_email(email)?;
        let resp = self.backend.login(email.trim(), password).await?;
        self.backend.set_token(Some(resp.token.clone()));
        if let Some(tokens) = &self.tokens {
            tokens.save(&resp.token, Some(email.trim()));
        }
        info!(user = %resp.user.id, role = resp.user.role.as_str(), "signed in");
        self.state = self.state.apply(Mutation::SignedIn(resp.user.clone()));
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "initial load after login failed");
        }
        Ok(resp.user)
    }

    /// Resume from a stored token. `Ok(None)` when there is nothing to resume.
    pub async fn restore(&mut self) -> Result<Option<User>, WorkflowError> {
        let Some(token) = self.tokens.as_ref().and_then(TokenStore::load) else {
            return Ok(None);
        };
        self.backend.set_token(Some(token));
        let user = match self.backend.current_user().await {
            Ok(user) => user,
            Err(e) if e.kind == ApiErrorKind::Unauthorized => {
                debug!("stored token rejected");
                self.backend.set_token(None);
                if let Some(tokens) = &self.tokens {
                    tokens.clear();
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        self.state = self.state.apply(Mutation::SignedIn(user.clone()));
        self.refresh().await?;
        Ok(Some(user))
    }

    /// Forget the token, the cache and the notifications. The activity echo stays.
    pub fn logout(&mut self) {
        self.backend.set_token(None);
        if let Some(tokens) = &self.tokens {
            tokens.clear();
        }
        self.state = self.state.apply(Mutation::SignedOut);
        self.notifications.clear();
    }

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<(), WorkflowError> {
        if name.trim().chars().count() < 2 {
            return Err(WorkflowError::Validation(Invalid::MissingName));
        }
        user::validate_email(email)?;
        user::validate_new_password(password, confirmation)?;
        let registration = Registration {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        self.backend.register(&registration).await?;
        Ok(())
    }

    pub async fn forgot_password(&mut self, email: &str) -> Result<(), WorkflowError> {
        user::validate_email(email)?;
        self.backend.forgot_password(email.trim()).await?;
        Ok(())
    }

    pub async fn validate_token(&mut self, token: &str) -> Result<TokenCheck, WorkflowError> {
        Ok(self.backend.validate_token(token).await?)
    }

    pub async fn setup_password(&mut self, token: &str, password: &str, confirmation: &str) -> Result<(), WorkflowError> {
        let change = Self::password_change(token, password, confirmation)?;
        self.backend.setup_password(&change).await?;
        Ok(())
    }

    pub async fn reset_password(&mut self, token: &str, password: &str, confirmation: &str) -> Result<(), WorkflowError> {
        let change = Self::password_change(token, password, confirmation)?;
        self.backend.reset_password(&change).await?;
        Ok(())
    }

    fn password_change(token: &str, password: &str, confirmation: &str) -> Result<PasswordChange, WorkflowError> {
        user::validate_new_password(password, confirmation)?;
        Ok(PasswordChange {
            token: token.to_string(),
            password: password.to_string(),
            confirmation: confirmation.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// Reload tasks (and users, for admins) from the backend.
    pub async fn refresh(&mut self) -> Result<(), WorkflowError> {
        let actor = self.actor()?;
        let scope = if actor.is_admin() { TaskScope::All } else { TaskScope::Mine };
        let mut tasks = match self.backend.list_tasks(scope).await {
            Ok(tasks) => tasks,
            Err(e) => {
                let message = messages::api_failure(e.kind, self.language);
                return Err(self.fail(&actor, e, message));
            }
        };
        if !actor.is_admin() {
            tasks.retain(|t| t.is_member(&actor.id));
        }
        debug!(count = tasks.len(), "tasks loaded");
        self.state = self.state.apply(Mutation::TasksLoaded(tasks));

        if actor.is_admin() {
            match self.backend.list_users().await {
                Ok(users) => self.state = self.state.apply(Mutation::UsersLoaded(users)),
                Err(e) => {
                    let message = messages::api_failure(e.kind, self.language);
                    return Err(self.fail(&actor, e, message));
                }
            }
        }
        Ok(())
    }

    /// Tasks the current user may see, filtered.
    pub fn visible_tasks(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.state.visible_tasks(filter)
    }

    /// Activity feed entries the current user may see.
    pub fn visible_activity(&self) -> Vec<&SystemActivity> {
        match &self.state.user {
            Some(viewer) => self.activities.visible_for(viewer, &self.state.tasks),
            None => Vec::new(),
        }
    }

    /// Moves the current user may make on a task.
    pub fn moves(&self, task: &Task) -> Moves {
        match &self.state.user {
            Some(actor) => available_moves(task, actor),
            None => Moves::default(),
        }
    }

    pub fn my_notifications(&self) -> Vec<&Notification> {
        match &self.state.user {
            Some(me) => self.notifications.for_user(&me.id).collect(),
            None => Vec::new(),
        }
    }

    pub fn unread_count(&self) -> usize {
        self.state
            .user
            .as_ref()
            .map_or(0, |me| self.notifications.unread_count(&me.id))
    }

    /// Mark the current user's notifications as read.
    pub fn mark_all_read(&mut self) -> usize {
        match self.state.user.as_ref().map(|u| u.id.clone()) {
            Some(id) => self.notifications.mark_all_read(&id),
            None => 0,
        }
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub async fn create_task(&mut self, draft: &TaskDraft) -> Result<Task, WorkflowError> {
        let actor = self.admin()?;
        draft.validate()?;
        let task = match self.backend.create_task(draft).await {
            Ok(reply) => {
                let local = draft.to_task(&reply.id, self.clock.now());
                reply.merged_over(&local)
            }
            Err(e) => {
                let message = messages::api_failure(e.kind, self.language);
                return Err(self.fail(&actor, e, message));
            }
        };
        info!(task = %task.id, "task created");
        self.state = self.state.apply(Mutation::TaskUpserted(task.clone()));
        self.record(ActivityDraft::on_task(&actor, ActivityKind::Created, &task.id, Some(&task.title)));
        self.toast(&actor.id, messages::task_created(self.language), Severity::Success);
        Ok(task)
    }

    pub async fn update_task(&mut self, id: &str, draft: &TaskDraft) -> Result<Task, WorkflowError> {
        let actor = self.actor()?;
        let cached = self.cached_task(id)?;
        if !actor.is_admin() && !cached.is_member(&actor.id) {
            return Err(WorkflowError::NotMember {
                user: actor.id.clone(),
                task: id.to_string(),
            });
        }
        draft.validate()?;
        let local = Task {
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            start: draft.start,
            deadline: draft.deadline,
            responsible_id: draft.responsible_id.clone(),
            participants: draft.participants.clone(),
            updated_at: self.clock.now(),
            ..cached
        };
        let task = match self.backend.update_task(id, draft).await {
            Ok(Some(reply)) => reply.merged_over(&local),
            Ok(None) => local,
            Err(e) => {
                let message = messages::api_failure(e.kind, self.language);
                return Err(self.fail(&actor, e, message));
            }
        };
        self.state = self.state.apply(Mutation::TaskUpserted(task.clone()));
        self.record(ActivityDraft::on_task(&actor, ActivityKind::Updated, id, Some(&task.title)));
        self.toast(&actor.id, messages::task_updated(self.language), Severity::Success);
        Ok(task)
    }

    /// Remove the task right away and put it back if the backend refuses.
    pub async fn delete_task(&mut self, id: &str) -> Result<(), WorkflowError> {
        let actor = self.admin()?;
        let task = self.cached_task(id)?;
        let pending = self.state.begin(Mutation::TaskRemoved(id.to_string()));
        self.state = pending.provisional().clone();

        if let Err(e) = self.backend.delete_task(id).await {
            self.state = pending.revert();
            let message = messages::task_delete_failed(self.language);
            return Err(self.fail(&actor, e, message));
        }
        self.state = pending.commit(None);
        info!(task = %id, "task deleted");
        self.record(ActivityDraft::on_task(&actor, ActivityKind::Deleted, id, Some(&task.title)));
        let message = messages::task_deleted(&task.title, self.language);
        self.toast(&actor.id, &message, Severity::Success);
        Ok(())
    }

    pub async fn advance(&mut self, id: &str) -> Result<Task, WorkflowError> {
        self.transition(id, Direction::Advance).await
    }

    pub async fn regress(&mut self, id: &str) -> Result<Task, WorkflowError> {
        self.transition(id, Direction::Regress).await
    }

    async fn transition(&mut self, id: &str, direction: Direction) -> Result<Task, WorkflowError> {
        let actor = self.actor()?;
        let task = self.cached_task(id)?;
        let plan = plan_transition(&task, &actor, direction)?;
        let now = self.clock.now();

        let pending = self.state.begin(Mutation::StatusChanged {
            task_id: plan.task_id.clone(),
            status: plan.to,
            at: now,
            closed_at: plan.stamps_close_time().then_some(now),
        });
        self.state = pending.provisional().clone();

        match self.backend.update_status(id, plan.to).await {
            Ok(reply) => {
                let merged = match (reply, pending.provisional().task(id)) {
                    (Some(reply), Some(known)) => Some(reply.merged_over(known)),
                    (reply, _) => reply,
                };
                self.state = pending.commit(merged.map(Mutation::TaskUpserted));
            }
            Err(e) => {
                self.state = pending.revert();
                let message = messages::status_update_failure(e.kind, self.language);
                return Err(self.fail(&actor, e, message));
            }
        }
        info!(task = %id, from = %plan.from, to = %plan.to, user = %actor.id, "status changed");

        if !actor.is_admin() {
            let text = plan.auto_comment();
            match self.backend.add_comment(id, &text).await {
                Ok(comment) => {
                    let comment = comment.unwrap_or_else(|| Comment {
                        id: Uuid::new_v4().to_string(),
                        author: actor.name.clone(),
                        text,
                        created_at: now,
                    });
                    self.state = self.state.apply(Mutation::CommentAdded {
                        task_id: id.to_string(),
                        comment,
                    });
                }
                Err(e) => warn!(task = %id, error = %e, "auto-comment failed; status change kept"),
            }
        }

        self.record(
            ActivityDraft::on_task(&actor, ActivityKind::StatusChanged, id, Some(&task.title))
                .with_statuses(plan.from, plan.to),
        );

        let updated = self.cached_task(id)?;
        self.notify_responsible(&updated, plan.to).await;
        Ok(updated)
    }

    /// Composed message to the task's responsible; falls back on failure.
    async fn notify_responsible(&mut self, task: &Task, status: Status) {
        let now = self.clock.now();
        let request = NotificationRequest {
            task_title: task.title.clone(),
            status,
            overdue: task.is_overdue(now),
            near_deadline: task.is_near_deadline(now),
            language: self.language,
        };
        let text = match self.composer.compose(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(task = %task.id, error = %e, "composer failed; using fallback text");
                fallback_message(self.language).to_string()
            }
        };
        let severity = if status == Status::Done { Severity::Success } else { Severity::Info };
        self.notifications.notify(&task.responsible_id, &text, severity, now);
    }

    pub async fn add_comment(&mut self, id: &str, text: &str) -> Result<Comment, WorkflowError> {
        let actor = self.actor()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkflowError::Validation(Invalid::EmptyComment));
        }
        let task = self.cached_task(id)?;
        if !actor.is_admin() && !task.is_member(&actor.id) {
            return Err(WorkflowError::NotMember {
                user: actor.id.clone(),
                task: id.to_string(),
            });
        }
        let comment = match self.backend.add_comment(id, text).await {
            Ok(Some(comment)) => comment,
            Ok(None) => Comment {
                id: Uuid::new_v4().to_string(),
                author: actor.name.clone(),
                text: text.to_string(),
                created_at: self.clock.now(),
            },
            Err(e) => {
                let message = messages::api_failure(e.kind, self.language);
                return Err(self.fail(&actor, e, message));
            }
        };
        self.state = self.state.apply(Mutation::CommentAdded {
            task_id: id.to_string(),
            comment: comment.clone(),
        });
        self.record(ActivityDraft::on_task(&actor, ActivityKind::Commented, id, Some(&task.title)));
        self.toast(&actor.id, messages::comment_added(self.language), Severity::Success);
        Ok(comment)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    fn email_in_use(&self, email: &str, except: Option<&str>) -> bool {
        self.state
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email.trim()) && Some(u.id.as_str()) != except)
    }

    pub async fn create_user(&mut self, draft: &UserDraft) -> Result<User, WorkflowError> {
        let actor = self.admin()?;
        draft.validate()?;
        if self.email_in_use(&draft.email, None) {
            return Err(WorkflowError::Validation(Invalid::EmailTaken));
        }
        let created = match self.backend.create_user(draft).await {
            Ok(created) => created,
            Err(e) => {
                let message = messages::api_failure(e.kind, self.language);
                return Err(self.fail(&actor, e, message));
            }
        };
        let user = match created {
            Some(user) => {
                self.state = self.state.apply(Mutation::UserUpserted(user.clone()));
                user
            }
            None => self.reload_user_by_email(&draft.email).await?,
        };
        info!(user = %user.id, "user created");
        let message = messages::user_created(&user.name, self.language);
        self.toast(&actor.id, &message, Severity::Success);
        self.notify_admins(&messages::admin_user_created(&user.name, &user.email, self.language));
        Ok(user)
    }

    /// The backend did not echo the new user; fetch the list and find it.
    async fn reload_user_by_email(&mut self, email: &str) -> Result<User, WorkflowError> {
        let users = self.backend.list_users().await?;
        self.state = self.state.apply(Mutation::UsersLoaded(users));
        self.state
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned()
            .ok_or_else(|| WorkflowError::UserNotFound(email.to_string()))
    }

    pub async fn update_user(&mut self, id: &str, draft: &UserDraft) -> Result<User, WorkflowError> {
        let actor = self.admin()?;
        let cached = self
            .state
            .find_user(id)
            .cloned()
            .ok_or_else(|| WorkflowError::UserNotFound(id.to_string()))?;
        draft.validate()?;
        if self.email_in_use(&draft.email, Some(id)) {
            return Err(WorkflowError::Validation(Invalid::EmailTaken));
        }
        let user = match self.backend.update_user(id, draft).await {
            Ok(Some(user)) => user,
            Ok(None) => User {
                name: draft.name.trim().to_string(),
                email: draft.email.trim().to_string(),
                role: draft.role,
                position: draft.position.clone(),
                department: draft.department.clone(),
                phone: draft.phone.clone(),
                ..cached
            },
            Err(e) => {
                let message = messages::api_failure(e.kind, self.language);
                return Err(self.fail(&actor, e, message));
            }
        };
        self.state = self.state.apply(Mutation::UserUpserted(user.clone()));
        let message = messages::user_updated(&user.name, self.language);
        self.toast(&actor.id, &message, Severity::Success);
        self.notify_admins(&messages::admin_user_updated(&user.name, &user.email, self.language));
        Ok(user)
    }

    /// Remove the user right away and put them back if the backend refuses.
    pub async fn delete_user(&mut self, id: &str) -> Result<(), WorkflowError> {
        let actor = self.admin()?;
        let target = self
            .state
            .find_user(id)
            .cloned()
            .ok_or_else(|| WorkflowError::UserNotFound(id.to_string()))?;
        let pending = self.state.begin(Mutation::UserRemoved(id.to_string()));
        self.state = pending.provisional().clone();

        if let Err(e) = self.backend.delete_user(id).await {
            self.state = pending.revert();
            let message = messages::user_delete_failed(&target.name, self.language);
            return Err(self.fail(&actor, e, &message));
        }
        self.state = pending.commit(None);
        info!(user = %id, "user deleted");
        let message = messages::user_deleted(&target.name, self.language);
        self.toast(&actor.id, &message, Severity::Success);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::backend::memory::{MemoryBackend, DEMO_PASSWORD};
    use crate::clock::ManualClock;
    use crate::compose::ComposeError;
    use crate::fields::Role;
    use crate::task::fixtures::at;
    use crate::task::Deadline;

    const ADMIN: &str = "admin@gestora.test";
    const BRUNO: &str = "bruno@gestora.test";

    struct Harness {
        backend: MemoryBackend,
        clock: ManualClock,
        session: Session,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(at(9));
        let backend = MemoryBackend::demo(Arc::new(clock.clone()));
        let session = Session::new(Arc::new(backend.clone()), Arc::new(clock.clone()));
        Harness { backend, clock, session }
    }

    async fn signed_in(email: &str) -> Harness {
        let mut h = harness();
        h.session.login(email, DEMO_PASSWORD).await.unwrap();
        h
    }

    fn activity_count(h: &Harness, kind: ActivityKind) -> usize {
        h.session.activities().entries().iter().filter(|a| a.kind == kind).count()
    }

    struct BrokenComposer;

    #[async_trait]
    impl Composer for BrokenComposer {
        async fn compose(&self, _: &NotificationRequest) -> Result<String, ComposeError> {
            Err(ComposeError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn member_advance_comments_records_and_notifies_the_responsible() {
        let mut h = signed_in(BRUNO).await;
        let task = h.session.advance("t1").await.unwrap();

        assert_eq!(task.status, Status::InProgress);
        assert_eq!(task.comments.len(), 1);
        assert_eq!(task.comments[0].text, "Advanced status to IN_PROGRESS");

        let changes: Vec<_> = h
            .session
            .activities()
            .entries()
            .iter()
            .filter(|a| a.kind == ActivityKind::StatusChanged)
            .collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from_status, Some(Status::Pending));
        assert_eq!(changes[0].to_status, Some(Status::InProgress));

        let mine = h.session.my_notifications();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].severity, Severity::Info);
        assert!(mine[0].message.contains("Prepare quarterly report"));
        assert_eq!(h.backend.task("t1").unwrap().status, Status::InProgress);
    }

    #[tokio::test]
    async fn member_cannot_move_a_done_task_and_nothing_happens() {
        let mut h = signed_in("carla@gestora.test").await;
        let calls_before = h.backend.calls().len();

        let err = h.session.advance("t4").await.unwrap_err();
        assert_eq!(err, WorkflowError::AdminOnly(Status::Done));
        assert!(err.is_local());
        assert_eq!(h.backend.calls().len(), calls_before);
        assert!(h.session.activities().is_empty());
        assert!(h.session.my_notifications().is_empty());
        assert_eq!(h.session.state().task("t4").unwrap().status, Status::Done);

        let moves = h.session.moves(h.session.state().task("t4").unwrap());
        assert_eq!(moves, Moves::default());
    }

    #[tokio::test]
    async fn member_cannot_reopen_a_done_task_but_admin_can() {
        let mut h = signed_in("carla@gestora.test").await;
        let calls_before = h.backend.calls().len();

        let err = h.session.regress("t4").await.unwrap_err();
        assert_eq!(err, WorkflowError::AdminOnly(Status::Done));
        assert!(err.is_local());
        assert_eq!(h.backend.calls().len(), calls_before);
        assert!(h.session.activities().is_empty());
        assert_eq!(h.session.state().task("t4").unwrap().status, Status::Done);
        assert_eq!(h.backend.task("t4").unwrap().status, Status::Done);

        let mut h = signed_in(ADMIN).await;
        let task = h.session.regress("t4").await.unwrap();
        assert_eq!(task.status, Status::InProgress);
        assert!(h.backend.calls().contains(&"update_status"));
    }

    #[tokio::test]
    async fn status_only_reply_keeps_the_cached_task() {
        let mut h = signed_in(BRUNO).await;
        h.backend.sparse_replies(true);

        let task = h.session.advance("t1").await.unwrap();
        assert_eq!(task.status, Status::InProgress);
        assert_eq!(task.title, "Prepare quarterly report");
        assert_eq!(task.responsible_id, "u2");
        assert_eq!(task.participants, vec!["u3".to_string()]);
        assert_eq!(task.comments.len(), 1);
        assert_eq!(h.session.my_notifications().len(), 1);
        assert_eq!(h.session.notifications().for_user("").count(), 0);

        let task = h.session.advance("t1").await.unwrap();
        assert_eq!(task.status, Status::Done);
        assert_eq!(task.responsible_id, "u2");
    }

    #[tokio::test]
    async fn admin_closes_done_task_without_auto_comment() {
        let mut h = signed_in(ADMIN).await;
        let task = h.session.advance("t4").await.unwrap();

        assert_eq!(task.status, Status::Closed);
        assert!(task.comments.is_empty());
        assert_eq!(activity_count(&h, ActivityKind::StatusChanged), 1);
        assert_eq!(h.session.notifications().for_user("u3").count(), 1);
        assert!(!h.backend.calls().contains(&"add_comment"));
    }

    #[tokio::test]
    async fn forbidden_update_leaves_cache_alone_and_tells_the_actor() {
        let mut h = signed_in(BRUNO).await;
        h.backend.fail_next(403);

        let err = h.session.advance("t1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Api(ApiError { kind: ApiErrorKind::Unauthorized, .. })));
        assert_eq!(h.session.state().task("t1").unwrap().status, Status::Pending);
        assert!(h.session.activities().is_empty());

        let mine = h.session.my_notifications();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].severity, Severity::Error);
        assert_eq!(mine[0].message, "No permission to update this task.");
    }

    #[tokio::test]
    async fn non_member_cannot_move_tasks() {
        let mut h = signed_in("carla@gestora.test").await;
        // Carla does not see t2, so seed it into her cache to test the rule.
        let foreign = h.backend.task("t2").unwrap();
        h.session.state = h.session.state.apply(Mutation::TaskUpserted(foreign));

        for direction in [Direction::Advance, Direction::Regress] {
            let err = h.session.transition("t2", direction).await.unwrap_err();
            assert!(matches!(err, WorkflowError::NotMember { .. }));
        }
    }

    #[tokio::test]
    async fn participant_may_regress() {
        let mut h = signed_in(BRUNO).await;
        let task = h.session.regress("t3").await.unwrap();
        assert_eq!(task.status, Status::Pending);
        assert_eq!(task.comments.last().unwrap().text, "Moved status back to PENDING");
    }

    #[tokio::test]
    async fn closed_tasks_do_not_move() {
        let mut h = signed_in(ADMIN).await;
        for direction in [Direction::Advance, Direction::Regress] {
            let err = h.session.transition("t5", direction).await.unwrap_err();
            assert!(matches!(err, WorkflowError::NoTransition { status: Status::Closed, .. }));
        }
    }

    #[tokio::test]
    async fn auto_comment_failure_keeps_the_status_change() {
        let mut h = signed_in(BRUNO).await;
        h.backend.fail_call("add_comment", 500);

        let task = h.session.advance("t1").await.unwrap();
        assert_eq!(task.status, Status::InProgress);
        assert!(task.comments.is_empty());
        assert_eq!(activity_count(&h, ActivityKind::StatusChanged), 1);
        assert!(h.session.my_notifications().iter().all(|n| n.severity != Severity::Error));
    }

    #[tokio::test]
    async fn advancing_onto_done_stamps_the_close_time() {
        let mut h = signed_in(BRUNO).await;
        h.session.advance("t1").await.unwrap();
        h.clock.advance(Duration::hours(1));
        let task = h.session.advance("t1").await.unwrap();
        assert_eq!(task.status, Status::Done);
        assert_eq!(task.closed_at, Some(at(10)));
        assert_eq!(task.comments.len(), 2);
    }

    #[tokio::test]
    async fn composer_failure_falls_back() {
        let mut h = harness();
        h.session = Session::new(Arc::new(h.backend.clone()), Arc::new(h.clock.clone()))
            .with_composer(Box::new(BrokenComposer));
        h.session.login(BRUNO, DEMO_PASSWORD).await.unwrap();

        h.session.advance("t1").await.unwrap();
        let mine = h.session.my_notifications();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].message, "Task update.");
    }

    #[tokio::test]
    async fn done_notification_is_a_success() {
        let mut h = signed_in(BRUNO).await;
        h.session.advance("t2").await.unwrap();
        let mine = h.session.my_notifications();
        assert_eq!(mine[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn admins_hear_about_every_accepted_activity() {
        let mut h = signed_in(ADMIN).await;
        let draft = TaskDraft {
            title: "Plan offsite".into(),
            description: String::new(),
            start: at(9),
            deadline: Deadline::days(4),
            responsible_id: "u2".into(),
            participants: vec![],
        };
        let task = h.session.create_task(&draft).await.unwrap();
        assert_eq!(activity_count(&h, ActivityKind::Created), 1);

        let messages: Vec<_> = h.session.my_notifications().iter().map(|n| n.message.clone()).collect();
        assert!(messages.contains(&"Task created.".to_string()));
        assert!(messages.contains(&"Created task: Plan offsite".to_string()));

        h.session.add_comment(&task.id, "kick-off on monday").await.unwrap();
        assert_eq!(activity_count(&h, ActivityKind::Commented), 1);
        assert_eq!(h.session.state().task(&task.id).unwrap().comments.len(), 1);
    }

    #[tokio::test]
    async fn employees_cannot_create_tasks() {
        let mut h = signed_in(BRUNO).await;
        let draft = TaskDraft::from_task(h.session.state().task("t1").unwrap());
        assert_eq!(h.session.create_task(&draft).await.unwrap_err(), WorkflowError::AdminRequired);
    }

    #[tokio::test]
    async fn invalid_draft_is_refused_before_the_backend() {
        let mut h = signed_in(ADMIN).await;
        let mut draft = TaskDraft::from_task(h.session.state().task("t1").unwrap());
        draft.responsible_id.clear();
        let calls = h.backend.calls().len();
        assert_eq!(
            h.session.create_task(&draft).await.unwrap_err(),
            WorkflowError::Validation(Invalid::MissingResponsible)
        );
        assert_eq!(h.backend.calls().len(), calls);
    }

    #[tokio::test]
    async fn failed_delete_puts_the_task_back() {
        let mut h = signed_in(ADMIN).await;
        h.backend.fail_next(500);
        assert!(h.session.delete_task("t1").await.is_err());
        assert!(h.session.state().task("t1").is_some());
        assert_eq!(h.session.my_notifications()[0].message, "Could not delete the task.");

        h.session.delete_task("t1").await.unwrap();
        assert!(h.session.state().task("t1").is_none());
        assert_eq!(activity_count(&h, ActivityKind::Deleted), 1);
    }

    #[tokio::test]
    async fn employees_only_see_activity_on_their_tasks() {
        let mut h = signed_in(ADMIN).await;
        h.session.advance("t4").await.unwrap();
        h.session.advance("t1").await.unwrap();
        h.session.logout();

        h.session.login("carla@gestora.test", DEMO_PASSWORD).await.unwrap();
        let visible = h.session.visible_activity();
        // t1 lists Carla as participant, t4 is hers.
        assert_eq!(visible.len(), 2);
        h.session.logout();
        h.session.login(BRUNO, DEMO_PASSWORD).await.unwrap();
        assert_eq!(h.session.visible_activity().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_caught_locally_then_by_the_backend() {
        let mut h = signed_in(ADMIN).await;
        let draft = UserDraft {
            name: "Bruno Two".into(),
            email: BRUNO.into(),
            role: Role::Employee,
            ..UserDraft::default()
        };
        assert_eq!(
            h.session.create_user(&draft).await.unwrap_err(),
            WorkflowError::Validation(Invalid::EmailTaken)
        );

        // A user the cache does not know about yet.
        h.backend.insert_user(
            User {
                id: "u9".into(),
                name: "Late".into(),
                email: "late@gestora.test".into(),
                role: Role::Employee,
                position: None,
                department: None,
                phone: None,
                avatar: None,
                must_change_password: false,
            },
            DEMO_PASSWORD,
        );
        let draft = UserDraft {
            name: "Someone".into(),
            email: "late@gestora.test".into(),
            ..UserDraft::default()
        };
        let err = h.session.create_user(&draft).await.unwrap_err();
        assert_eq!(
            err.user_message(Language::En),
            "This email is already registered. Use a different email."
        );
    }

    #[tokio::test]
    async fn user_management_round() {
        let mut h = signed_in(ADMIN).await;
        let draft = UserDraft {
            name: "Diana Lopes".into(),
            email: "diana@gestora.test".into(),
            ..UserDraft::default()
        };
        let user = h.session.create_user(&draft).await.unwrap();
        assert!(user.must_change_password);
        assert!(h
            .session
            .my_notifications()
            .iter()
            .any(|n| n.message == "New user created: Diana Lopes (diana@gestora.test)"));

        let mut edit = UserDraft::from_user(&user);
        edit.department = Some("Finance".into());
        let updated = h.session.update_user(&user.id, &edit).await.unwrap();
        assert_eq!(updated.department.as_deref(), Some("Finance"));

        h.backend.fail_next(500);
        assert!(h.session.delete_user(&user.id).await.is_err());
        assert!(h.session.state().find_user(&user.id).is_some());
        h.session.delete_user(&user.id).await.unwrap();
        assert!(h.session.state().find_user(&user.id).is_none());
    }

    #[tokio::test]
    async fn restore_uses_the_stored_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness();
        h.session = Session::new(Arc::new(h.backend.clone()), Arc::new(h.clock.clone())).with_storage(dir.path());
        assert_eq!(h.session.restore().await.unwrap(), None);
        h.session.login(BRUNO, DEMO_PASSWORD).await.unwrap();
        h.session.advance("t1").await.unwrap();

        let mut again = Session::new(Arc::new(h.backend.clone()), Arc::new(h.clock.clone())).with_storage(dir.path());
        let user = again.restore().await.unwrap().unwrap();
        assert_eq!(user.id, "u2");
        assert_eq!(again.activities().len(), 1);
        assert_eq!(again.remembered_email().as_deref(), Some(BRUNO));
        assert!(again.state().task("t1").is_some());

        again.logout();
        assert!(again.state().user.is_none());
        let mut third = Session::new(Arc::new(h.backend.clone()), Arc::new(h.clock.clone())).with_storage(dir.path());
        assert_eq!(third.restore().await.unwrap(), None);
    }

    #[tokio::test]
    async fn notifications_cool_down_then_reopen() {
        let mut h = signed_in(BRUNO).await;
        h.session.toast("u2", "hello", Severity::Info);
        h.session.toast("u2", "hello", Severity::Info);
        assert_eq!(h.session.unread_count(), 1);
        h.clock.advance(Duration::seconds(11));
        h.session.toast("u2", "hello", Severity::Info);
        assert_eq!(h.session.unread_count(), 2);
        assert_eq!(h.session.mark_all_read(), 2);
        assert_eq!(h.session.unread_count(), 0);
    }

    #[tokio::test]
    async fn password_forms_are_checked_locally() {
        let mut h = harness();
        assert_eq!(
            h.session.reset_password("tok", "abc", "abc").await.unwrap_err(),
            WorkflowError::Validation(Invalid::PasswordTooShort)
        );
        assert_eq!(
            h.session.setup_password("tok", "abcdef", "abcdeg").await.unwrap_err(),
            WorkflowError::Validation(Invalid::PasswordMismatch)
        );
        assert!(h.backend.calls().is_empty());

        h.session.register("Eva", "eva@gestora.test", "secret1", "secret1").await.unwrap();
        h.session.login("eva@gestora.test", "secret1").await.unwrap();
        assert_eq!(h.session.user().unwrap().role, Role::Employee);
    }
}
