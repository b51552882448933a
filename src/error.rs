//! Error types for the workflow core.
//!
//! Backend failures are categorised once, at the transport boundary, into an
//! [`ApiErrorKind`]. Everything the UI layer can receive is a [`WorkflowError`],
//! which carries enough structure to pick a single displayable sentence.

use std::path::PathBuf;

use thiserror::Error;

use crate::fields::{Language, Status};
use crate::messages;
use crate::workflow::Direction;

/// Category of a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 400: the backend rejected the payload.
    InvalidRequest,
    /// 401 or 403.
    Unauthorized,
    /// 404.
    NotFound,
    /// 409: usually a duplicate email.
    Conflict,
    /// Any 5xx.
    Server,
    /// The request never produced a response.
    Network,
    /// Anything else, including undecodable bodies.
    Unknown,
}

impl ApiErrorKind {
    /// Map an HTTP status code onto a category.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ApiErrorKind::InvalidRequest,
            401 | 403 => ApiErrorKind::Unauthorized,
            404 => ApiErrorKind::NotFound,
            409 => ApiErrorKind::Conflict,
            500..=599 => ApiErrorKind::Server,
            _ => ApiErrorKind::Unknown,
        }
    }
}

/// A failed call to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend error ({kind:?}{}): {message}", status.map(|s| format!(" {s}")).unwrap_or_default())]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    /// Build an error from a non-success response.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::from_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    /// The request failed before a response arrived.
    pub fn network(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    /// The response arrived but could not be understood.
    pub fn malformed(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Unknown,
            status: None,
            message: message.into(),
        }
    }
}

/// Form-level validation failures, raised before any backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalid {
    MissingTitle,
    MissingResponsible,
    InvalidDeadline,
    EmptyComment,
    MissingName,
    InvalidEmail,
    EmailTaken,
    PasswordTooShort,
    PasswordMismatch,
}

/// Every failure the session layer can hand back to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("unknown status '{0}'")]
    UnknownStatus(String),

    #[error("user {user} is not a member of task {task}")]
    NotMember { user: String, task: String },

    #[error("only administrators can move a task out of {0}")]
    AdminOnly(Status),

    #[error("administrator role required")]
    AdminRequired,

    #[error("no {direction} step from {status}")]
    NoTransition { status: Status, direction: Direction },

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("invalid input: {0:?}")]
    Validation(Invalid),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl WorkflowError {
    /// The single sentence shown to the user for this failure.
    pub fn user_message(&self, lang: Language) -> String {
        match self {
            WorkflowError::UnknownStatus(raw) => messages::unknown_status(raw, lang),
            WorkflowError::NotMember { .. } => messages::not_member(lang).to_string(),
            WorkflowError::AdminOnly(_) => messages::admin_only_done(lang).to_string(),
            WorkflowError::AdminRequired => messages::admin_required(lang).to_string(),
            WorkflowError::NoTransition { .. } => messages::no_action(lang).to_string(),
            WorkflowError::TaskNotFound(_) => messages::api_failure(ApiErrorKind::NotFound, lang).to_string(),
            WorkflowError::UserNotFound(_) => messages::user_not_found(lang).to_string(),
            WorkflowError::NotSignedIn => messages::not_signed_in(lang).to_string(),
            WorkflowError::Validation(invalid) => messages::invalid(*invalid, lang).to_string(),
            WorkflowError::Api(err) => messages::api_failure(err.kind, lang).to_string(),
        }
    }

    /// True for refusals decided locally (no backend call was made).
    pub fn is_local(&self) -> bool {
        !matches!(self, WorkflowError::Api(_))
    }
}

/// Failures loading `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no home directory available; pass --dir")]
    NoHome,
}

/// Failures of the best-effort local echo files.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(400, ApiErrorKind::InvalidRequest)]
    #[case(401, ApiErrorKind::Unauthorized)]
    #[case(403, ApiErrorKind::Unauthorized)]
    #[case(404, ApiErrorKind::NotFound)]
    #[case(409, ApiErrorKind::Conflict)]
    #[case(500, ApiErrorKind::Server)]
    #[case(503, ApiErrorKind::Server)]
    #[case(418, ApiErrorKind::Unknown)]
    fn status_codes_map_to_categories(#[case] status: u16, #[case] kind: ApiErrorKind) {
        assert_eq!(ApiError::from_status(status, "x").kind, kind);
    }

    #[test]
    fn local_refusals_are_flagged() {
        assert!(WorkflowError::NotSignedIn.is_local());
        assert!(!WorkflowError::Api(ApiError::network("down")).is_local());
    }

    #[test]
    fn forbidden_reads_as_no_permission() {
        let err = WorkflowError::from(ApiError::from_status(403, "Forbidden"));
        assert_eq!(err.user_message(Language::En), "You do not have permission to perform this action.");
    }
}
