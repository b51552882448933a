//! Enumerations and field types for the task workflow.
//!
//! This module defines the closed sets the rest of the crate works with:
//! task status (together with its ordering and the one alias table used to
//! read backend spellings), user role, notification severity, activity kinds,
//! deadline units and the display language.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::WorkflowError;

/// Task lifecycle status.
///
/// `Pending → InProgress → Done → Closed` is the manual pipeline. `Overdue`
/// sits outside it: only the backend's deadline evaluation puts a task there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum Status {
    Pending,
    InProgress,
    Done,
    Closed,
    Overdue,
}

/// Every spelling the backend has been seen to send, after normalisation
/// (uppercase, spaces and hyphens folded to `_`).
const STATUS_ALIASES: &[(&str, Status)] = &[
    ("PENDING", Status::Pending),
    ("PENDENTE", Status::Pending),
    ("OPEN", Status::Pending),
    ("ABERTO", Status::Pending),
    ("ABERTA", Status::Pending),
    ("TODO", Status::Pending),
    ("IN_PROGRESS", Status::InProgress),
    ("EM_PROGRESSO", Status::InProgress),
    ("EM_ANDAMENTO", Status::InProgress),
    ("EM_EXECUCAO", Status::InProgress),
    ("IN_REVIEW", Status::InProgress),
    ("EM_REVISAO", Status::InProgress),
    ("REVISAO", Status::InProgress),
    ("DONE", Status::Done),
    ("TERMINADO", Status::Done),
    ("FINISHED", Status::Done),
    ("COMPLETED", Status::Done),
    ("CONCLUIDA", Status::Done),
    ("CONCLUÍDA", Status::Done),
    ("CONCLUIDO", Status::Done),
    ("CONCLUÍDO", Status::Done),
    ("CLOSED", Status::Closed),
    ("FECHADO", Status::Closed),
    ("ARCHIVED", Status::Closed),
    ("ARQUIVADO", Status::Closed),
    ("ARQUIVADA", Status::Closed),
    ("CANCELLED", Status::Closed),
    ("CANCELED", Status::Closed),
    ("CANCELADA", Status::Closed),
    ("OVERDUE", Status::Overdue),
    ("ATRASADA", Status::Overdue),
    ("ATRASADO", Status::Overdue),
];

impl Status {
    /// The manual pipeline, in order.
    pub const ORDER: [Status; 4] = [Status::Pending, Status::InProgress, Status::Done, Status::Closed];

    /// Every status, pipeline first, for board columns and reports.
    pub const ALL: [Status; 5] = [
        Status::Pending,
        Status::InProgress,
        Status::Done,
        Status::Closed,
        Status::Overdue,
    ];

    /// Resolve any backend spelling to a status.
    pub fn resolve(raw: &str) -> Result<Status, WorkflowError> {
        let key: String = raw
            .trim()
            .to_uppercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        STATUS_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, status)| *status)
            .ok_or_else(|| WorkflowError::UnknownStatus(raw.to_string()))
    }

    fn position(self) -> Option<usize> {
        Status::ORDER.iter().position(|s| *s == self)
    }

    /// The following pipeline step, if any.
    pub fn next(self) -> Option<Status> {
        self.position().and_then(|i| Status::ORDER.get(i + 1).copied())
    }

    /// The preceding pipeline step, if any.
    pub fn previous(self) -> Option<Status> {
        self.position()
            .and_then(|i| i.checked_sub(1))
            .map(|i| Status::ORDER[i])
    }

    /// Canonical spelling, used in comments, activities and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Done => "DONE",
            Status::Closed => "CLOSED",
            Status::Overdue => "OVERDUE",
        }
    }

    /// Spelling sent to the backend.
    pub fn wire_name(self, dialect: StatusDialect) -> &'static str {
        match (dialect, self) {
            (StatusDialect::En, _) => self.as_str(),
            (StatusDialect::Pt, Status::Pending) => "PENDENTE",
            (StatusDialect::Pt, Status::InProgress) => "EM_PROGRESSO",
            (StatusDialect::Pt, Status::Done) => "TERMINADO",
            (StatusDialect::Pt, Status::Closed) => "FECHADO",
            (StatusDialect::Pt, Status::Overdue) => "ATRASADA",
        }
    }

    /// Human label for the board and tables.
    pub fn label(self, lang: Language) -> &'static str {
        match (lang, self) {
            (Language::En, Status::Pending) => "Pending",
            (Language::En, Status::InProgress) => "In Progress",
            (Language::En, Status::Done) => "Done",
            (Language::En, Status::Closed) => "Closed",
            (Language::En, Status::Overdue) => "Overdue",
            (Language::Pt, Status::Pending) => "Pendente",
            (Language::Pt, Status::InProgress) => "Em Progresso",
            (Language::Pt, Status::Done) => "Terminado",
            (Language::Pt, Status::Closed) => "Fechado",
            (Language::Pt, Status::Overdue) => "Atrasada",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Status::resolve(&raw).map_err(serde::de::Error::custom)
    }
}

/// How statuses are spelled on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatusDialect {
    #[default]
    En,
    Pt,
}

/// User role. Managers and plain users of the backend are employees here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    #[default]
    #[serde(alias = "USER", alias = "MANAGER")]
    Employee,
}

impl Role {
    /// Read a backend role string; anything but ADMIN is an employee.
    pub fn from_wire(raw: &str) -> Role {
        if raw.trim().eq_ignore_ascii_case("admin") || raw.trim().eq_ignore_ascii_case("role_admin") {
            Role::Admin
        } else {
            Role::Employee
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Employee => "EMPLOYEE",
        }
    }
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

/// What an activity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Created,
    Updated,
    Deleted,
    StatusChanged,
    Commented,
    /// Kinds written by a newer client; summarised generically.
    #[serde(other)]
    Other,
}

/// Unit of a task deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineUnit {
    #[default]
    Days,
    Hours,
}

/// Display language for user-facing sentences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Pt,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Pt => "pt",
        }
    }
}
