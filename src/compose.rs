//! Notification text generation.
//!
//! Status-change notifications are worded by a [`Composer`]. The production
//! system delegates this to an external text-generation service; the crate
//! ships [`TemplateComposer`], which writes the sentence locally. Callers fall
//! back to [`fallback_message`] whenever composition fails.

use async_trait::async_trait;
use thiserror::Error;

use crate::fields::{Language, Status};

/// What the composer is asked to describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub task_title: String,
    pub status: Status,
    pub overdue: bool,
    pub near_deadline: bool,
    pub language: Language,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("composer unavailable: {0}")]
    Unavailable(String),
    #[error("composer returned no text")]
    Empty,
}

#[async_trait]
pub trait Composer: Send + Sync {
    /// A single sentence describing the update.
    async fn compose(&self, request: &NotificationRequest) -> Result<String, ComposeError>;
}

/// Generic sentence used when composition fails.
pub fn fallback_message(lang: Language) -> &'static str {
    match lang {
        Language::En => "Task update.",
        Language::Pt => "Atualização na tarefa.",
    }
}

/// Writes the sentence from fixed templates: urgent when overdue,
/// encouraging near the deadline, plain otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateComposer;

#[async_trait]
impl Composer for TemplateComposer {
    async fn compose(&self, request: &NotificationRequest) -> Result<String, ComposeError> {
        let title = request.task_title.trim();
        if title.is_empty() {
            return Err(ComposeError::Empty);
        }
        let status = request.status.label(request.language);
        let text = match (request.language, request.overdue, request.near_deadline) {
            (Language::En, true, _) => {
                format!("\"{title}\" is overdue and now {status}; please resolve it as a priority.")
            }
            (Language::En, false, true) => {
                format!("\"{title}\" moved to {status}, the deadline is close, keep it up!")
            }
            (Language::En, false, false) => format!("\"{title}\" is now {status}."),
            (Language::Pt, true, _) => {
                format!("\"{title}\" está em atraso e agora {status}; resolva com prioridade.")
            }
            (Language::Pt, false, true) => {
                format!("\"{title}\" passou para {status}, o prazo está próximo, continue!")
            }
            (Language::Pt, false, false) => format!("\"{title}\" está agora {status}."),
        };
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(overdue: bool, near: bool) -> NotificationRequest {
        NotificationRequest {
            task_title: "Quarterly report".into(),
            status: Status::InProgress,
            overdue,
            near_deadline: near,
            language: Language::En,
        }
    }

    #[tokio::test]
    async fn tone_follows_the_flags() {
        let c = TemplateComposer;
        assert_eq!(c.compose(&request(false, false)).await.unwrap(), "\"Quarterly report\" is now In Progress.");
        assert!(c.compose(&request(false, true)).await.unwrap().contains("deadline is close"));
        assert!(c.compose(&request(true, true)).await.unwrap().contains("overdue"));
    }

    #[tokio::test]
    async fn empty_titles_fail() {
        let mut r = request(false, false);
        r.task_title = " ".into();
        assert!(matches!(TemplateComposer.compose(&r).await, Err(ComposeError::Empty)));
    }
}
