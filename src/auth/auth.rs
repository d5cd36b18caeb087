use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::{error::AppError, model::role::Role};

/// Caller identity, placed in the request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Missing token".into())),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".into()))
        }
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Instructor/Admin only".into()))
        }
    }

    /// Returns the caller's id when the caller is a student.
    pub fn require_student(&self) -> Result<u64, AppError> {
        if self.role == Role::Student {
            Ok(self.user_id)
        } else {
            Err(AppError::Forbidden("Students only".into()))
        }
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 9,
            username: "u".into(),
            role,
        }
    }

    #[test]
    fn test_role_guards() {
        assert!(user(Role::Admin).require_admin().is_ok());
        assert!(user(Role::Instructor).require_admin().is_err());
        assert!(user(Role::Instructor).require_staff().is_ok());
        assert!(user(Role::Student).require_staff().is_err());
        assert_eq!(user(Role::Student).require_student().ok(), Some(9));
        assert!(user(Role::Admin).require_student().is_err());
    }
}
