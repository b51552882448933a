//! Turn backend JSON into model types.
//!
//! The backend has shipped several shapes over time: numeric or string ids,
//! `id`/`userId`, `name`/`username`, Portuguese field names, deadlines given
//! as a value and unit or only as a delivery date. Everything is folded into
//! one shape here so the rest of the crate never sees the variants.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::{ApiError, WorkflowError};
use crate::fields::{DeadlineUnit, Role, Status};
use crate::task::{Comment, Deadline, Task};
use crate::user::User;

/// First present, non-null field among `keys`.
fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| value.get(*k)).find(|v| !v.is_null())
}

/// Ids arrive as numbers or strings.
pub fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(_) => field(value, &["id", "userId"]).and_then(id_of),
        _ => None,
    }
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    field(value, keys).and_then(|v| v.as_str()).map(str::to_string)
}

/// RFC 3339, naive ISO date-time (taken as UTC) or a bare date.
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

fn time_field(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    field(value, keys).and_then(|v| v.as_str()).and_then(parse_time)
}

fn malformed(what: &str) -> ApiError {
    ApiError::malformed(format!("response is missing {what}"))
}

/// A list response: a bare array or an object wrapping one.
pub fn list_items<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    if let Some(items) = value.as_array() {
        return items;
    }
    keys.iter()
        .chain(["data"].iter())
        .filter_map(|k| value.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .next()
        .unwrap_or(&[])
}

pub fn user_from_json(value: &Value) -> Result<User, ApiError> {
    let id = field(value, &["id", "userId"]).and_then(id_of).ok_or_else(|| malformed("user id"))?;
    let email = str_field(value, &["email"]).unwrap_or_default();
    let name = str_field(value, &["name", "username", "fullName", "nome"]).unwrap_or_else(|| email.clone());
    Ok(User {
        id,
        name,
        email,
        role: str_field(value, &["role", "perfil"]).map_or(Role::Employee, |r| Role::from_wire(&r)),
        position: str_field(value, &["position", "cargo"]),
        department: str_field(value, &["department", "departamento"]),
        phone: str_field(value, &["phone", "telefone"]),
        avatar: str_field(value, &["avatar", "avatarUrl"]),
        must_change_password: field(value, &["mustChangePassword", "firstLogin"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

pub fn comment_from_json(value: &Value) -> Result<Comment, ApiError> {
    Ok(Comment {
        id: field(value, &["id"]).and_then(id_of).ok_or_else(|| malformed("comment id"))?,
        author: str_field(value, &["userName", "author", "authorName"])
            .or_else(|| value.get("user").and_then(|u| str_field(u, &["name", "username"])))
            .unwrap_or_default(),
        text: str_field(value, &["text", "content", "texto"]).unwrap_or_default(),
        created_at: time_field(value, &["timestamp", "createdAt"]).unwrap_or_else(Utc::now),
    })
}

/// Ids of everyone attached to the task, responsible first if known.
fn responsibles(value: &Value) -> Vec<String> {
    field(value, &["responsibles", "responsaveis"])
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(id_of).collect())
        .unwrap_or_default()
}

/// `raw` as a deadline amount, or `None` (logged) when it does not fit.
fn amount_of(raw: u64, key: &str) -> Option<u32> {
    u32::try_from(raw).map_err(|_| warn!(key, raw, "deadline out of range")).ok()
}

fn deadline_of(value: &Value, start: DateTime<Utc>) -> Deadline {
    let explicit = field(value, &["deadlineValue"]).and_then(Value::as_u64);
    if let Some(amount) = explicit.and_then(|raw| amount_of(raw, "deadlineValue")) {
        let unit = match str_field(value, &["deadlineType"]).as_deref() {
            Some("hours") | Some("horas") => DeadlineUnit::Hours,
            _ => DeadlineUnit::Days,
        };
        return Deadline { amount, unit };
    }
    let days = field(value, &["daysToFinish"]).and_then(Value::as_u64);
    if let Some(days) = days.and_then(|raw| amount_of(raw, "daysToFinish")) {
        return Deadline::days(days);
    }
    let hours = match time_field(value, &["deliveryDate", "dueDate"]) {
        Some(delivery) if delivery > start => {
            let raw = (delivery - start).num_hours().max(1);
            u64::try_from(raw).ok().and_then(|raw| amount_of(raw, "deliveryDate"))
        }
        _ => None,
    };
    match hours {
        Some(hours) if hours % 24 == 0 => Deadline::days(hours / 24),
        Some(hours) => Deadline::hours(hours),
        None => Deadline::days(0),
    }
}

pub fn task_from_json(value: &Value) -> Result<Task, WorkflowError> {
    let id = field(value, &["id", "taskId"]).and_then(id_of).ok_or_else(|| malformed("task id"))?;
    let status = match str_field(value, &["status", "estado"]) {
        Some(raw) => Status::resolve(&raw)?,
        None => Status::Pending,
    };

    let mut people = responsibles(value);
    let responsible_id = field(value, &["responsibleId", "assignedUserId", "responsavelId"])
        .and_then(id_of)
        .or_else(|| value.get("responsible").and_then(id_of))
        .or_else(|| people.first().cloned())
        .unwrap_or_default();
    let mut participants: Vec<String> = field(value, &["intervenientes", "participants", "participantIds"])
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(id_of).collect())
        .unwrap_or_default();
    people.retain(|p| *p != responsible_id && !participants.contains(p));
    participants.extend(people);

    let created_at = time_field(value, &["createdAt", "dataCriacao"]).unwrap_or_else(Utc::now);
    let start = time_field(value, &["startDate", "dataInicio"]).unwrap_or(created_at);
    let comments = field(value, &["comments", "comentarios"])
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| comment_from_json(c).map_err(|e| warn!(error = %e, "skipping comment")).ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(Task {
        id,
        title: str_field(value, &["title", "titulo"]).unwrap_or_default(),
        description: str_field(value, &["description", "descricao"]).unwrap_or_default(),
        status,
        responsible_id,
        participants,
        start,
        deadline: deadline_of(value, start),
        created_at,
        updated_at: time_field(value, &["updatedAt"]).unwrap_or(created_at),
        closed_at: time_field(value, &["closedAt", "completedAt"]),
        comments,
    })
}

/// Every task in a list response; unreadable entries are logged and skipped.
pub fn tasks_from_json(value: &Value) -> Vec<Task> {
    list_items(value, &["tasks", "content"])
        .iter()
        .filter_map(|item| match task_from_json(item) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "skipping task from backend");
                None
            }
        })
        .collect()
}

pub fn users_from_json(value: &Value) -> Vec<User> {
    list_items(value, &["users", "content"])
        .iter()
        .filter_map(|item| match user_from_json(item) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "skipping user from backend");
                None
            }
        })
        .collect()
}

/// The auth token of a login response.
pub fn token_of(value: &Value) -> Option<String> {
    str_field(value, &["token", "jwt", "accessToken"])
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;

    #[test]
    fn user_aliases_are_merged() {
        let u = user_from_json(&json!({"userId": 7, "username": "ana", "email": "ana@x.pt", "role": "USER"})).unwrap();
        assert_eq!(u.id, "7");
        assert_eq!(u.name, "ana");
        assert_eq!(u.role, Role::Employee);

        let u = user_from_json(&json!({"id": "a1", "name": "Rui", "role": "ADMIN", "mustChangePassword": true})).unwrap();
        assert!(u.is_admin());
        assert!(u.must_change_password);
        assert!(user_from_json(&json!({"name": "nobody"})).is_err());
    }

    #[test]
    fn task_with_portuguese_status_and_responsibles() {
        let t = task_from_json(&json!({
            "id": 12,
            "title": "Inventário",
            "status": "EM_ANDAMENTO",
            "responsibles": [3, 4],
            "startDate": "2024-05-06T08:00:00",
            "daysToFinish": 3,
            "comments": [{"id": 1, "userName": "ana", "text": "ok", "timestamp": "2024-05-06T09:00:00Z"}]
        }))
        .unwrap();
        assert_eq!(t.id, "12");
        assert_eq!(t.status, Status::InProgress);
        assert_eq!(t.responsible_id, "3");
        assert_eq!(t.participants, vec!["4".to_string()]);
        assert_eq!(t.deadline, Deadline::days(3));
        assert_eq!(t.comments.len(), 1);
        assert_eq!(t.delivery_at(), Utc.with_ymd_and_hms(2024, 5, 9, 8, 0, 0).unwrap());
    }

    #[test]
    fn deadline_derived_from_delivery_date() {
        let t = task_from_json(&json!({
            "id": "t",
            "responsibleId": "e1",
            "startDate": "2024-05-06T08:00:00Z",
            "deliveryDate": "2024-05-06T14:00:00Z"
        }))
        .unwrap();
        assert_eq!(t.deadline, Deadline::hours(6));
        assert_eq!(t.delivery_at() - t.start, Duration::hours(6));
    }

    #[test]
    fn oversized_deadline_is_not_truncated() {
        let t = task_from_json(&json!({
            "id": "t",
            "responsibleId": "e1",
            "deadlineValue": 4_294_967_297u64,
            "daysToFinish": 2
        }))
        .unwrap();
        assert_eq!(t.deadline, Deadline::days(2));

        let t = task_from_json(&json!({"id": "t", "deadlineValue": 4_294_967_297u64})).unwrap();
        assert_eq!(t.deadline, Deadline::days(0));
    }

    #[test]
    fn assigned_user_is_the_responsible() {
        let t = task_from_json(&json!({"id": 5, "assignedUserId": 9, "participantIds": [2]})).unwrap();
        assert_eq!(t.responsible_id, "9");
        assert_eq!(t.participants, vec!["2".to_string()]);
    }

    #[test]
    fn unknown_status_is_an_error_and_lists_skip_it() {
        let bad = json!({"id": 1, "status": "LIMBO"});
        assert!(matches!(task_from_json(&bad), Err(WorkflowError::UnknownStatus(_))));
        let list = json!({"data": [bad, {"id": 2, "status": "FECHADO"}]});
        let tasks = tasks_from_json(&list);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, Status::Closed);
    }

    #[test]
    fn list_shapes() {
        assert_eq!(list_items(&json!([1, 2]), &["users"]).len(), 2);
        assert_eq!(list_items(&json!({"users": [1]}), &["users"]).len(), 1);
        assert_eq!(list_items(&json!({"data": [1, 2, 3]}), &["users"]).len(), 3);
        assert!(list_items(&json!({"other": 1}), &["users"]).is_empty());
    }

    #[test]
    fn time_formats() {
        assert!(parse_time("2024-05-06T08:00:00.123").is_some());
        assert!(parse_time("2024-05-06").is_some());
        assert!(parse_time("06/05/2024").is_none());
    }
}
