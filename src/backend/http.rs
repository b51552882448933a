//! [`Backend`] over the REST API.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::normalize::{self, comment_from_json, task_from_json, user_from_json};
use super::{Backend, LoginResponse, PasswordChange, Registration, TaskScope, TokenCheck};
use crate::error::ApiError;
use crate::fields::{DeadlineUnit, Role, Status, StatusDialect};
use crate::task::{Comment, Task, TaskDraft};
use crate::user::{User, UserDraft};

pub struct HttpBackend {
    client: Client,
    base_url: String,
    dialect: StatusDialect,
    token: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration, dialect: StatusDialect) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(e.to_string()))?;
        Ok(HttpBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            dialect,
            token: RwLock::new(None),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, format!("{}{}", self.base_url, path));
        match self.token.read().as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send and decode; non-2xx becomes an [`ApiError`], an empty body `Null`.
    async fn send(&self, req: RequestBuilder) -> Result<Value, ApiError> {
        let resp = req.send().await.map_err(|e| {
            warn!(error = %e, "backend unreachable");
            ApiError::network(e.to_string())
        })?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::network(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = body.len(), "backend response");

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    ["message", "error"]
                        .iter()
                        .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
                })
                .unwrap_or(body);
            return Err(ApiError::from_status(status.as_u16(), message));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    fn task_payload(&self, draft: &TaskDraft) -> Value {
        let days = match draft.deadline.unit {
            DeadlineUnit::Days => draft.deadline.amount,
            DeadlineUnit::Hours => draft.deadline.amount.div_ceil(24),
        };
        let mut responsibles = vec![draft.responsible_id.clone()];
        responsibles.extend(draft.participants.iter().cloned());
        json!({
            "title": draft.title,
            "description": draft.description,
            "startDate": draft.start.to_rfc3339(),
            "deliveryDate": draft.delivery_preview().to_rfc3339(),
            "deadlineValue": draft.deadline.amount,
            "deadlineType": match draft.deadline.unit {
                DeadlineUnit::Days => "days",
                DeadlineUnit::Hours => "hours",
            },
            "daysToFinish": days,
            "responsibleId": draft.responsible_id,
            "intervenientes": draft.participants,
            "responsibles": responsibles,
        })
    }

    /// The entity in a create/update response, which may be wrapped.
    fn unwrap_entity<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
        match value.get(key) {
            Some(inner) if inner.is_object() => Some(inner),
            _ if value.is_object() => Some(value),
            _ => None,
        }
    }

    fn optional_task(value: &Value) -> Option<Task> {
        let entity = Self::unwrap_entity(value, "task")?;
        task_from_json(entity)
            .map_err(|e| warn!(error = %e, "ignoring unreadable task in response"))
            .ok()
    }

    fn optional_user(value: &Value) -> Option<User> {
        let entity = Self::unwrap_entity(value, "user")?;
        user_from_json(entity)
            .map_err(|e| warn!(error = %e, "ignoring unreadable user in response"))
            .ok()
    }

    fn user_payload(draft: &UserDraft) -> Value {
        json!({
            "name": draft.name,
            "email": draft.email,
            "role": match draft.role {
                Role::Admin => "ADMIN",
                Role::Employee => "USER",
            },
            "position": draft.position,
            "department": draft.department,
            "phone": draft.phone,
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let value = self
            .send(self.request(Method::POST, "/auth/login").json(&json!({ "email": email, "password": password })))
            .await?;
        let token = normalize::token_of(&value).ok_or_else(|| ApiError::malformed("login response has no token"))?;
        let mut user = user_from_json(Self::unwrap_entity(&value, "user").unwrap_or(&value))?;
        if user.email.is_empty() {
            user.email = email.to_string();
        }
        Ok(LoginResponse { token, user })
    }

    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let payload = json!({
            "name": registration.name,
            "email": registration.email,
            "password": registration.password,
        });
        self.send(self.request(Method::POST, "/auth/register").json(&payload)).await?;
        Ok(())
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        let value = self.send(self.request(Method::GET, "/auth/me")).await?;
        user_from_json(Self::unwrap_entity(&value, "user").unwrap_or(&value))
    }

    async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::POST, "/auth/forgot-password").json(&json!({ "email": email })))
            .await?;
        Ok(())
    }

    async fn validate_token(&self, token: &str) -> Result<TokenCheck, ApiError> {
        let value = self
            .send(self.request(Method::GET, &format!("/auth/validate-token/{token}")))
            .await?;
        Ok(TokenCheck {
            valid: value.get("valid").and_then(Value::as_bool).unwrap_or(true),
            email: value.get("email").and_then(Value::as_str).map(str::to_string),
        })
    }

    async fn setup_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        let payload = json!({
            "token": change.token,
            "password": change.password,
            "passwordConfirmation": change.confirmation,
        });
        self.send(self.request(Method::POST, "/auth/setup-password").json(&payload)).await?;
        Ok(())
    }

    async fn reset_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        let payload = json!({
            "token": change.token,
            "password": change.password,
            "confirmPassword": change.confirmation,
        });
        self.send(self.request(Method::POST, "/auth/reset-password").json(&payload)).await?;
        Ok(())
    }

    async fn list_tasks(&self, scope: TaskScope) -> Result<Vec<Task>, ApiError> {
        let path = match scope {
            TaskScope::All => "/tasks",
            TaskScope::Mine => "/tasks/my",
        };
        let value = self.send(self.request(Method::GET, path)).await?;
        Ok(normalize::tasks_from_json(&value))
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let mut payload = self.task_payload(draft);
        payload["status"] = json!(Status::Pending.wire_name(self.dialect));
        let value = self
            .send(self.request(Method::POST, "/admin/tasks/with-responsibles").json(&payload))
            .await?;
        let entity = Self::unwrap_entity(&value, "task").ok_or_else(|| ApiError::malformed("no task in response"))?;
        task_from_json(entity).map_err(|e| ApiError::malformed(e.to_string()))
    }

    async fn update_task(&self, id: &str, draft: &TaskDraft) -> Result<Option<Task>, ApiError> {
        let value = self
            .send(self.request(Method::PUT, &format!("/tasks/{id}")).json(&self.task_payload(draft)))
            .await?;
        Ok(Self::optional_task(&value))
    }

    async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &format!("/tasks/{id}"))).await?;
        Ok(())
    }

    async fn update_status(&self, id: &str, status: Status) -> Result<Option<Task>, ApiError> {
        let payload = json!({ "status": status.wire_name(self.dialect) });
        let value = self
            .send(self.request(Method::PATCH, &format!("/tasks/{id}/status")).json(&payload))
            .await?;
        Ok(Self::optional_task(&value))
    }

    async fn add_comment(&self, task_id: &str, text: &str) -> Result<Option<Comment>, ApiError> {
        let value = self
            .send(self.request(Method::POST, &format!("/tasks/{task_id}/comments")).json(&json!({ "text": text })))
            .await?;
        Ok(Self::unwrap_entity(&value, "comment").and_then(|c| comment_from_json(c).ok()))
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let value = self.send(self.request(Method::GET, "/admin/users")).await?;
        Ok(normalize::users_from_json(&value))
    }

    async fn create_user(&self, draft: &UserDraft) -> Result<Option<User>, ApiError> {
        let value = self
            .send(self.request(Method::POST, "/admin/users").json(&Self::user_payload(draft)))
            .await?;
        Ok(Self::optional_user(&value))
    }

    async fn update_user(&self, id: &str, draft: &UserDraft) -> Result<Option<User>, ApiError> {
        let value = self
            .send(self.request(Method::PUT, &format!("/admin/users/{id}")).json(&Self::user_payload(draft)))
            .await?;
        Ok(Self::optional_user(&value))
    }

    async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &format!("/admin/users/{id}"))).await?;
        Ok(())
    }
}
