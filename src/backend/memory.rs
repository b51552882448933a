//! In-process [`Backend`] used for offline mode and tests.
//!
//! It enforces the same rules the REST service does (membership for status
//! changes, admin-only user management, unique emails) and answers with the
//! same status codes, so session code cannot tell the two apart. Clones share
//! one store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::normalize::task_from_json;
use super::{Backend, LoginResponse, PasswordChange, Registration, TaskScope, TokenCheck};
use crate::clock::Clock;
use crate::error::ApiError;
use crate::fields::{Role, Status};
use crate::task::{Comment, Deadline, Task, TaskDraft};
use crate::user::{User, UserDraft};

/// Password of every seeded demo account.
pub const DEMO_PASSWORD: &str = "demo123";
/// The seeded administrator.
pub const DEMO_ADMIN_EMAIL: &str = "admin@gestora.test";

#[derive(Default)]
struct Store {
    users: Vec<User>,
    passwords: HashMap<String, String>,
    tasks: Vec<Task>,
    sessions: HashMap<String, String>,
    /// Setup/reset tokens mapped to the email they belong to.
    password_tokens: HashMap<String, String>,
    token: Option<String>,
    /// Injected failures: `(call, status)`, where `None` matches any call.
    failures: Vec<(Option<&'static str>, u16)>,
    calls: Vec<&'static str>,
    /// Answer status changes with only the id and the new status.
    sparse: bool,
    next_id: u64,
}

impl Store {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn caller(&self) -> Result<&User, ApiError> {
        self.token
            .as_ref()
            .and_then(|t| self.sessions.get(t))
            .and_then(|id| self.users.iter().find(|u| &u.id == id))
            .ok_or_else(|| ApiError::from_status(401, "not authenticated"))
    }

    fn admin(&self) -> Result<&User, ApiError> {
        let user = self.caller()?;
        if user.is_admin() {
            Ok(user)
        } else {
            Err(ApiError::from_status(403, "administrator role required"))
        }
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, ApiError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ApiError::from_status(404, format!("task {id} not found")))
    }

    fn email_taken(&self, email: &str, except: Option<&str>) -> bool {
        self.users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id.as_str()) != except)
    }
}

#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    /// An empty backend with no users.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MemoryBackend {
            store: Arc::new(Mutex::new(Store::default())),
            clock,
        }
    }

    /// One administrator, two employees and a few tasks across the board.
    pub fn demo(clock: Arc<dyn Clock>) -> Self {
        let backend = MemoryBackend::new(clock);
        let now = backend.clock.now();
        let people = [
            ("u1", "Ana Costa", DEMO_ADMIN_EMAIL, Role::Admin, "Director"),
            ("u2", "Bruno Reis", "bruno@gestora.test", Role::Employee, "Analyst"),
            ("u3", "Carla Sousa", "carla@gestora.test", Role::Employee, "Designer"),
        ];
        for (id, name, email, role, position) in people {
            backend.insert_user(
                User {
                    id: id.to_string(),
                    name: name.to_string(),
                    email: email.to_string(),
                    role,
                    position: Some(position.to_string()),
                    department: Some("Operations".to_string()),
                    phone: None,
                    avatar: None,
                    must_change_password: false,
                },
                DEMO_PASSWORD,
            );
        }
        let tasks = [
            ("t1", "Prepare quarterly report", Status::Pending, "u2", vec!["u3"], Deadline::days(5)),
            ("t2", "Update supplier contracts", Status::InProgress, "u2", vec![], Deadline::hours(20)),
            ("t3", "Redesign onboarding flyer", Status::InProgress, "u3", vec!["u2"], Deadline::days(3)),
            ("t4", "Archive 2023 invoices", Status::Done, "u3", vec![], Deadline::days(2)),
            ("t5", "Renew office insurance", Status::Closed, "u2", vec![], Deadline::days(7)),
            ("t6", "Reply to audit findings", Status::Overdue, "u3", vec![], Deadline::days(1)),
        ];
        for (i, (id, title, status, responsible, participants, deadline)) in tasks.into_iter().enumerate() {
            let start = now - Duration::days(i as i64);
            backend.insert_task(Task {
                id: id.to_string(),
                title: title.to_string(),
                description: String::new(),
                status,
                responsible_id: responsible.to_string(),
                participants: participants.into_iter().map(str::to_string).collect(),
                start,
                deadline,
                created_at: start,
                updated_at: start,
                closed_at: matches!(status, Status::Done | Status::Closed).then_some(start + deadline.as_duration()),
                comments: Vec::new(),
            });
        }
        backend
    }

    pub fn insert_user(&self, user: User, password: &str) {
        let mut store = self.store.lock();
        store.passwords.insert(user.id.clone(), password.to_string());
        store.users.push(user);
    }

    pub fn insert_task(&self, task: Task) {
        self.store.lock().tasks.push(task);
    }

    /// Make the next call fail with `status`.
    pub fn fail_next(&self, status: u16) {
        self.store.lock().failures.push((None, status));
    }

    /// Reply to status changes with a body that carries only id and status.
    pub fn sparse_replies(&self, on: bool) {
        self.store.lock().sparse = on;
    }

    /// Make the next call named `call` fail with `status`.
    pub fn fail_call(&self, call: &'static str, status: u16) {
        self.store.lock().failures.push((Some(call), status));
    }

    /// Names of the calls received so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.store.lock().calls.clone()
    }

    /// The token a forgot-password request (or user creation) issued for `email`.
    pub fn password_token_for(&self, email: &str) -> Option<String> {
        let store = self.store.lock();
        store
            .password_tokens
            .iter()
            .find(|(_, e)| e.eq_ignore_ascii_case(email))
            .map(|(t, _)| t.clone())
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.store.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Lock the store, log the call and honour an injected failure.
    fn enter(&self, call: &'static str) -> Result<parking_lot::MutexGuard<'_, Store>, ApiError> {
        let mut store = self.store.lock();
        store.calls.push(call);
        debug!(call, "memory backend");
        let injected = store
            .failures
            .iter()
            .position(|(target, _)| target.map_or(true, |t| t == call));
        match injected {
            Some(i) => {
                let (_, status) = store.failures.remove(i);
                Err(ApiError::from_status(status, format!("injected failure on {call}")))
            }
            None => Ok(store),
        }
    }

    fn change_password(&self, call: &'static str, change: &PasswordChange) -> Result<(), ApiError> {
        let mut store = self.enter(call)?;
        let email = store
            .password_tokens
            .remove(&change.token)
            .ok_or_else(|| ApiError::from_status(400, "invalid or expired token"))?;
        let id = store
            .users
            .iter_mut()
            .find(|u| u.email.eq_ignore_ascii_case(&email))
            .map(|u| {
                u.must_change_password = false;
                u.id.clone()
            })
            .ok_or_else(|| ApiError::from_status(404, "user not found"))?;
        store.passwords.insert(id, change.password.clone());
        Ok(())
    }
}

fn user_from_draft(id: String, draft: &UserDraft) -> User {
    User {
        id,
        name: draft.name.trim().to_string(),
        email: draft.email.trim().to_string(),
        role: draft.role,
        position: draft.position.clone(),
        department: draft.department.clone(),
        phone: draft.phone.clone(),
        avatar: None,
        must_change_password: true,
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn set_token(&self, token: Option<String>) {
        self.store.lock().token = token;
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let mut store = self.enter("login")?;
        let user = store
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .filter(|u| store.passwords.get(&u.id).map(String::as_str) == Some(password))
            .cloned()
            .ok_or_else(|| ApiError::from_status(401, "invalid credentials"))?;
        let token = format!("mem-{}", Uuid::new_v4().simple());
        store.sessions.insert(token.clone(), user.id.clone());
        Ok(LoginResponse { token, user })
    }

    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let mut store = self.enter("register")?;
        if store.email_taken(&registration.email, None) {
            return Err(ApiError::from_status(409, "email already registered"));
        }
        let id = store.next_id("u-");
        store.passwords.insert(id.clone(), registration.password.clone());
        store.users.push(User {
            id,
            name: registration.name.trim().to_string(),
            email: registration.email.trim().to_string(),
            role: Role::Employee,
            position: None,
            department: None,
            phone: None,
            avatar: None,
            must_change_password: false,
        });
        Ok(())
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        let store = self.enter("current_user")?;
        store.caller().cloned()
    }

    async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let mut store = self.enter("forgot_password")?;
        // Unknown emails succeed silently, like the real service.
        if store.email_taken(email, None) {
            let token = Uuid::new_v4().simple().to_string();
            store.password_tokens.insert(token, email.trim().to_string());
        }
        Ok(())
    }

    async fn validate_token(&self, token: &str) -> Result<TokenCheck, ApiError> {
        let store = self.enter("validate_token")?;
        let email = store.password_tokens.get(token).cloned();
        Ok(TokenCheck {
            valid: email.is_some(),
            email,
        })
    }

    async fn setup_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        self.change_password("setup_password", change)
    }

    async fn reset_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        self.change_password("reset_password", change)
    }

    async fn list_tasks(&self, scope: TaskScope) -> Result<Vec<Task>, ApiError> {
        let store = self.enter("list_tasks")?;
        let caller = store.caller()?;
        let tasks = match scope {
            TaskScope::All if caller.is_admin() => store.tasks.clone(),
            TaskScope::All => return Err(ApiError::from_status(403, "administrator role required")),
            TaskScope::Mine => store.tasks.iter().filter(|t| t.is_member(&caller.id)).cloned().collect(),
        };
        Ok(tasks)
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let mut store = self.enter("create_task")?;
        store.admin()?;
        if draft.title.trim().is_empty() || draft.responsible_id.is_empty() {
            return Err(ApiError::from_status(400, "title and responsible are required"));
        }
        let now = self.clock.now();
        let task = Task {
            id: store.next_id("t-"),
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            status: Status::Pending,
            responsible_id: draft.responsible_id.clone(),
            participants: draft.participants.clone(),
            start: draft.start,
            deadline: draft.deadline,
            created_at: now,
            updated_at: now,
            closed_at: None,
            comments: Vec::new(),
        };
        store.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &str, draft: &TaskDraft) -> Result<Option<Task>, ApiError> {
        let mut store = self.enter("update_task")?;
        let caller = store.caller()?.clone();
        let now = self.clock.now();
        let task = store.task_mut(id)?;
        if !caller.is_admin() && !task.is_member(&caller.id) {
            return Err(ApiError::from_status(403, "not a member of this task"));
        }
        task.title = draft.title.trim().to_string();
        task.description = draft.description.clone();
        task.start = draft.start;
        task.deadline = draft.deadline;
        task.responsible_id = draft.responsible_id.clone();
        task.participants = draft.participants.clone();
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        let mut store = self.enter("delete_task")?;
        store.admin()?;
        store.task_mut(id)?;
        store.tasks.retain(|t| t.id != id);
        Ok(())
    }

    async fn update_status(&self, id: &str, status: Status) -> Result<Option<Task>, ApiError> {
        let mut store = self.enter("update_status")?;
        let caller = store.caller()?.clone();
        let now = self.clock.now();
        let sparse = store.sparse;
        let task = store.task_mut(id)?;
        if !caller.is_admin() && !task.is_member(&caller.id) {
            return Err(ApiError::from_status(403, "not a member of this task"));
        }
        if task.status == Status::Done && !caller.is_admin() {
            return Err(ApiError::from_status(403, "only administrators can move finished tasks"));
        }
        if status == Status::Done && task.status != Status::Done {
            task.closed_at = Some(now);
        }
        task.status = status;
        task.updated_at = now;
        if sparse {
            return Ok(task_from_json(&json!({ "id": task.id, "status": status.as_str() })).ok());
        }
        Ok(Some(task.clone()))
    }

    async fn add_comment(&self, task_id: &str, text: &str) -> Result<Option<Comment>, ApiError> {
        let mut store = self.enter("add_comment")?;
        let caller = store.caller()?.clone();
        if text.trim().is_empty() {
            return Err(ApiError::from_status(400, "empty comment"));
        }
        let comment = Comment {
            id: store.next_id("c-"),
            author: caller.name.clone(),
            text: text.trim().to_string(),
            created_at: self.clock.now(),
        };
        let task = store.task_mut(task_id)?;
        if !caller.is_admin() && !task.is_member(&caller.id) {
            return Err(ApiError::from_status(403, "not a member of this task"));
        }
        task.comments.push(comment.clone());
        Ok(Some(comment))
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let store = self.enter("list_users")?;
        store.admin()?;
        Ok(store.users.clone())
    }

    async fn create_user(&self, draft: &UserDraft) -> Result<Option<User>, ApiError> {
        let mut store = self.enter("create_user")?;
        store.admin()?;
        if store.email_taken(&draft.email, None) {
            return Err(ApiError::from_status(409, "email already registered"));
        }
        let user = user_from_draft(store.next_id("u-"), draft);
        // New accounts get a setup link instead of a password.
        store
            .password_tokens
            .insert(Uuid::new_v4().simple().to_string(), user.email.clone());
        store.users.push(user.clone());
        Ok(Some(user))
    }

    async fn update_user(&self, id: &str, draft: &UserDraft) -> Result<Option<User>, ApiError> {
        let mut store = self.enter("update_user")?;
        store.admin()?;
        if store.email_taken(&draft.email, Some(id)) {
            return Err(ApiError::from_status(409, "email already registered"));
        }
        let user = store
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| ApiError::from_status(404, format!("user {id} not found")))?;
        let mut updated = user_from_draft(id.to_string(), draft);
        updated.avatar = user.avatar.take();
        updated.must_change_password = user.must_change_password;
        *user = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        let mut store = self.enter("delete_user")?;
        store.admin()?;
        let before = store.users.len();
        store.users.retain(|u| u.id != id);
        if store.users.len() == before {
            return Err(ApiError::from_status(404, format!("user {id} not found")));
        }
        store.passwords.remove(id);
        Ok(())
    }
}
