//! The REST collaborator behind every task, user and auth operation.
//!
//! [`Backend`] is the seam: [`HttpBackend`] talks to the real service,
//! [`MemoryBackend`] keeps everything in process for offline demos and tests.
//! Calls that may or may not return the updated entity answer with an
//! `Option`; `None` means the caller should synthesize the change locally.

pub mod http;
pub mod memory;
pub mod normalize;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::fields::Status;
use crate::task::{Comment, Task, TaskDraft};
use crate::user::{User, UserDraft};

pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Which task list to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// Every task (administrators).
    All,
    /// Tasks the caller is a member of.
    Mine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// Result of checking a setup/reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCheck {
    pub valid: bool,
    pub email: Option<String>,
}

/// Password setup or reset form, already checked locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChange {
    pub token: String,
    pub password: String,
    pub confirmation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Token sent with every following call; `None` signs out.
    fn set_token(&self, token: Option<String>);

    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError>;
    async fn register(&self, registration: &Registration) -> Result<(), ApiError>;
    async fn current_user(&self) -> Result<User, ApiError>;
    async fn forgot_password(&self, email: &str) -> Result<(), ApiError>;
    async fn validate_token(&self, token: &str) -> Result<TokenCheck, ApiError>;
    async fn setup_password(&self, change: &PasswordChange) -> Result<(), ApiError>;
    async fn reset_password(&self, change: &PasswordChange) -> Result<(), ApiError>;

    async fn list_tasks(&self, scope: TaskScope) -> Result<Vec<Task>, ApiError>;
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError>;
    async fn update_task(&self, id: &str, draft: &TaskDraft) -> Result<Option<Task>, ApiError>;
    async fn delete_task(&self, id: &str) -> Result<(), ApiError>;
    async fn update_status(&self, id: &str, status: Status) -> Result<Option<Task>, ApiError>;
    async fn add_comment(&self, task_id: &str, text: &str) -> Result<Option<Comment>, ApiError>;

    async fn list_users(&self) -> Result<Vec<User>, ApiError>;
    async fn create_user(&self, draft: &UserDraft) -> Result<Option<User>, ApiError>;
    async fn update_user(&self, id: &str, draft: &UserDraft) -> Result<Option<User>, ApiError>;
    async fn delete_user(&self, id: &str) -> Result<(), ApiError>;
}
