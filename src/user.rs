//! Users and the form checks done before talking to the backend.

use serde::{Deserialize, Serialize};

use crate::error::{Invalid, WorkflowError};
use crate::fields::Role;

/// Minimum password length accepted by the setup/reset forms.
pub const PASSWORD_MIN_LENGTH: usize = 6;

/// A user as mirrored from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub position: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub must_change_password: bool,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Fields of the create/edit user form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub position: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

impl UserDraft {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().chars().count() < 2 {
            return Err(WorkflowError::Validation(Invalid::MissingName));
        }
        validate_email(&self.email)
    }

    pub fn from_user(user: &User) -> Self {
        UserDraft {
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            position: user.position.clone(),
            department: user.department.clone(),
            phone: user.phone.clone(),
        }
    }
}

/// Loose `local@domain.tld` shape check.
pub fn validate_email(email: &str) -> Result<(), WorkflowError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !email.contains(char::is_whitespace)
                && domain.split_once('.').map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(WorkflowError::Validation(Invalid::InvalidEmail))
    }
}

/// Password plus confirmation, as entered on the setup and reset forms.
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), WorkflowError> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(WorkflowError::Validation(Invalid::PasswordTooShort));
    }
    if password != confirmation {
        return Err(WorkflowError::Validation(Invalid::PasswordMismatch));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("ana@example.com", true)]
    #[case("ana@example", false)]
    #[case("@example.com", false)]
    #[case("ana maria@example.com", false)]
    #[case("plain", false)]
    fn email_shape(#[case] email: &str, #[case] ok: bool) {
        assert_eq!(validate_email(email).is_ok(), ok);
    }

    #[test]
    fn password_rules() {
        assert_eq!(
            validate_new_password("abc", "abc"),
            Err(WorkflowError::Validation(Invalid::PasswordTooShort))
        );
        assert_eq!(
            validate_new_password("abcdef", "abcdeg"),
            Err(WorkflowError::Validation(Invalid::PasswordMismatch))
        );
        assert!(validate_new_password("abcdef", "abcdef").is_ok());
    }
}
