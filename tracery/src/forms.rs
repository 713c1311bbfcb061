//! Form state for login and sign-up, checked before anything is sent.

use crate::types::{LoginRequest, SignUpRequest};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("{0} must not be empty")]
    Missing(&'static str),
    #[error("passwords do not match")]
    PasswordMismatch,
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub login: String,
    pub password: String,
}

impl LoginForm {
    /// # Errors
    /// Returns [`FormError::Missing`] for an empty login or password.
    pub fn submit(&self) -> Result<LoginRequest, FormError> {
        require("login", &self.login)?;
        require("password", &self.password)?;
        Ok(LoginRequest::new(self.login.trim(), self.password.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub repeat_password: String,
}

impl SignUpForm {
    /// Validates the form and builds the request body.
    ///
    /// # Errors
    /// Returns [`FormError::Missing`] for the first empty field, or
    /// [`FormError::PasswordMismatch`] if the two passwords differ.
    pub fn submit(&self) -> Result<SignUpRequest, FormError> {
        require("nickname", &self.nickname)?;
        require("first name", &self.first_name)?;
        require("last name", &self.last_name)?;
        require("email", &self.email)?;
        require("password", &self.password)?;
        if self.password != self.repeat_password {
            return Err(FormError::PasswordMismatch);
        }
        Ok(SignUpRequest {
            nickname: self.nickname.trim().to_string(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

fn require(field: &'static str, value: &str) -> Result<(), FormError> {
    if value.trim().is_empty() {
        return Err(FormError::Missing(field));
    }
    Ok(())
}
