//! User-facing sentences, in English and Portuguese.

use crate::error::{ApiErrorKind, Invalid};
use crate::fields::Language;

macro_rules! pick {
    ($lang:expr, $en:expr, $pt:expr) => {
        match $lang {
            Language::En => $en,
            Language::Pt => $pt,
        }
    };
}

/// One sentence per backend failure category.
pub fn api_failure(kind: ApiErrorKind, lang: Language) -> &'static str {
    match kind {
        ApiErrorKind::InvalidRequest => pick!(lang, "The request was rejected as invalid.", "Pedido inválido."),
        ApiErrorKind::Unauthorized => pick!(
            lang,
            "You do not have permission to perform this action.",
            "Não tem permissão para realizar esta ação."
        ),
        ApiErrorKind::NotFound => pick!(lang, "Resource not found.", "Recurso não encontrado."),
        ApiErrorKind::Conflict => pick!(
            lang,
            "This email is already registered. Use a different email.",
            "Este email já está registado no sistema. Use um email diferente."
        ),
        ApiErrorKind::Server => pick!(
            lang,
            "Server error. Please try again later.",
            "Erro no servidor. Tente novamente mais tarde."
        ),
        ApiErrorKind::Network => pick!(
            lang,
            "Could not reach the server. Check your connection.",
            "Não foi possível conectar ao servidor. Verifique a sua ligação."
        ),
        ApiErrorKind::Unknown => pick!(
            lang,
            "Something went wrong. Please try again.",
            "Ocorreu um erro desconhecido. Tente novamente."
        ),
    }
}

/// Failure sentence for a rejected status update.
pub fn status_update_failure(kind: ApiErrorKind, lang: Language) -> &'static str {
    match kind {
        ApiErrorKind::InvalidRequest => pick!(lang, "Invalid status.", "Status inválido."),
        ApiErrorKind::Unauthorized => pick!(
            lang,
            "No permission to update this task.",
            "Sem permissão para atualizar esta tarefa."
        ),
        ApiErrorKind::NotFound => pick!(lang, "Task not found.", "Tarefa não encontrada."),
        ApiErrorKind::Server => pick!(lang, "Internal server error.", "Erro interno no servidor."),
        _ => pick!(
            lang,
            "Could not update the status on the server.",
            "Não foi possível atualizar o estado na API."
        ),
    }
}

pub fn invalid(invalid: Invalid, lang: Language) -> &'static str {
    match invalid {
        Invalid::MissingTitle => pick!(lang, "A title is required.", "O título é obrigatório."),
        Invalid::MissingResponsible => pick!(lang, "Choose a responsible.", "Escolha um responsável."),
        Invalid::InvalidDeadline => pick!(
            lang,
            "The deadline must be greater than zero.",
            "O prazo tem de ser maior que zero."
        ),
        Invalid::EmptyComment => pick!(lang, "The comment is empty.", "O comentário está vazio."),
        Invalid::MissingName => pick!(
            lang,
            "The name must have at least 2 characters.",
            "O nome deve ter pelo menos 2 caracteres."
        ),
        Invalid::InvalidEmail => pick!(lang, "Please enter a valid email.", "Por favor, insira um email válido."),
        Invalid::EmailTaken => api_failure(ApiErrorKind::Conflict, lang),
        Invalid::PasswordTooShort => pick!(
            lang,
            "The password must have at least 6 characters.",
            "A senha deve ter pelo menos 6 caracteres."
        ),
        Invalid::PasswordMismatch => pick!(lang, "Passwords do not match.", "As senhas não coincidem."),
    }
}

pub fn unknown_status(raw: &str, lang: Language) -> String {
    pick!(lang, format!("Unknown status '{raw}'."), format!("Estado desconhecido '{raw}'."))
}

pub fn not_member(lang: Language) -> &'static str {
    pick!(lang, "You are not a member of this task.", "Você não é membro desta tarefa.")
}

pub fn admin_only_done(lang: Language) -> &'static str {
    pick!(
        lang,
        "Only administrators can move finished tasks.",
        "Apenas administradores podem mover tarefas finalizadas."
    )
}

pub fn admin_required(lang: Language) -> &'static str {
    pick!(
        lang,
        "Only administrators can do this.",
        "Apenas administradores podem realizar esta ação."
    )
}

pub fn no_action(lang: Language) -> &'static str {
    pick!(lang, "No action available.", "Nenhuma ação disponível.")
}

pub fn user_not_found(lang: Language) -> &'static str {
    pick!(lang, "User not found.", "Utilizador não encontrado.")
}

pub fn not_signed_in(lang: Language) -> &'static str {
    pick!(lang, "Please sign in first.", "Faça login primeiro.")
}

pub fn task_created(lang: Language) -> &'static str {
    pick!(lang, "Task created.", "Tarefa criada com sucesso.")
}

pub fn task_updated(lang: Language) -> &'static str {
    pick!(lang, "Task updated.", "Tarefa atualizada com sucesso.")
}

pub fn task_deleted(title: &str, lang: Language) -> String {
    pick!(lang, format!("Task \"{title}\" deleted."), format!("Tarefa \"{title}\" eliminada com sucesso."))
}

pub fn task_delete_failed(lang: Language) -> &'static str {
    pick!(lang, "Could not delete the task.", "Não foi possível eliminar a tarefa na API.")
}

pub fn comment_added(lang: Language) -> &'static str {
    pick!(lang, "Comment added.", "Comentário adicionado.")
}

pub fn user_created(name: &str, lang: Language) -> String {
    pick!(lang, format!("User {name} created."), format!("Utilizador {name} criado com sucesso."))
}

pub fn user_updated(name: &str, lang: Language) -> String {
    pick!(lang, format!("User {name} updated."), format!("Utilizador {name} atualizado com sucesso."))
}

pub fn user_deleted(name: &str, lang: Language) -> String {
    pick!(lang, format!("User {name} deleted."), format!("Utilizador {name} eliminado com sucesso."))
}

pub fn user_delete_failed(name: &str, lang: Language) -> String {
    pick!(lang, format!("Could not delete {name}."), format!("Não foi possível eliminar {name} na API."))
}

/// Sent to administrators when someone adds a user.
pub fn admin_user_created(name: &str, email: &str, lang: Language) -> String {
    pick!(
        lang,
        format!("New user created: {name} ({email})"),
        format!("Novo utilizador criado: {name} ({email})")
    )
}

pub fn admin_user_updated(name: &str, email: &str, lang: Language) -> String {
    pick!(
        lang,
        format!("User updated: {name} ({email})"),
        format!("Utilizador atualizado: {name} ({email})")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failures_have_their_own_wording() {
        assert_eq!(status_update_failure(ApiErrorKind::InvalidRequest, Language::En), "Invalid status.");
        assert_eq!(
            status_update_failure(ApiErrorKind::Unauthorized, Language::En),
            "No permission to update this task."
        );
        assert_eq!(status_update_failure(ApiErrorKind::NotFound, Language::Pt), "Tarefa não encontrada.");
        assert_eq!(
            status_update_failure(ApiErrorKind::Network, Language::En),
            "Could not update the status on the server."
        );
    }
}
