use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::utils::validation::error;

/// Missing values are reported by `required`; only two present, different values fail.
fn confirmation_matches(password: Option<&String>, confirm: Option<&String>) -> Result<(), ValidationError> {
    match (password, confirm) {
        (Some(password), Some(confirm)) if password != confirm => {
            Err(error("passwordConfirm", "Passwords are not the same!"))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "signup_passwords_match"))]
pub struct SignupSchema {
    #[validate(
        required(message = "Please tell us your name!"),
        custom(function = "crate::utils::validation::validate_not_blank", message = "Please tell us your name!")
    )]
    pub name: Option<String>,

    #[validate(
        required(message = "Please provide your email"),
        email(message = "Please provide a valid email")
    )]
    pub email: Option<String>,

    #[validate(
        required(message = "Please provide a password"),
        length(min = 8, message = "Password must be at least 8 characters long")
    )]
    pub password: Option<String>,

    #[validate(required(message = "Please confirm your password"))]
    pub password_confirm: Option<String>,
}

// Presence is checked by the handler so the client gets one combined message.
#[derive(Debug, Deserialize)]
pub struct LoginSchema {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordSchema {
    #[validate(required(message = "Please provide your email"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "reset_passwords_match"))]
pub struct ResetPasswordSchema {
    #[validate(
        required(message = "Please provide a password"),
        length(min = 8, message = "Password must be at least 8 characters long")
    )]
    pub password: Option<String>,

    #[validate(required(message = "Please confirm your password"))]
    pub password_confirm: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "new_passwords_match"))]
pub struct UpdatePasswordSchema {
    #[validate(required(message = "Please provide your current password"))]
    pub password_current: Option<String>,

    #[validate(
        required(message = "Please provide a password"),
        length(min = 8, message = "Password must be at least 8 characters long")
    )]
    pub password: Option<String>,

    #[validate(required(message = "Please confirm your password"))]
    pub password_confirm: Option<String>,
}

fn signup_passwords_match(payload: &SignupSchema) -> Result<(), ValidationError> {
    confirmation_matches(payload.password.as_ref(), payload.password_confirm.as_ref())
}

fn reset_passwords_match(payload: &ResetPasswordSchema) -> Result<(), ValidationError> {
    confirmation_matches(payload.password.as_ref(), payload.password_confirm.as_ref())
}

fn new_passwords_match(payload: &UpdatePasswordSchema) -> Result<(), ValidationError> {
    confirmation_matches(payload.password.as_ref(), payload.password_confirm.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signup(body: serde_json::Value) -> SignupSchema {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn signup_accepts_complete_payload() {
        let payload = signup(json!({
            "name": "Jonas Schmedtmann",
            "email": "jonas@example.com",
            "password": "pass1234",
            "passwordConfirm": "pass1234"
        }));
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn signup_rejects_mismatched_confirmation() {
        let payload = signup(json!({
            "name": "Jonas",
            "email": "jonas@example.com",
            "password": "pass1234",
            "passwordConfirm": "pass4321"
        }));
        let err: crate::errors::AppError = payload.validate().unwrap_err().into();
        assert_eq!(err.message, "Invalid input data. Passwords are not the same!");
        assert_eq!(err.errors.unwrap()["passwordConfirm"][0], "Passwords are not the same!");
    }

    #[test]
    fn reset_and_update_compare_the_confirmation() {
        let reset: ResetPasswordSchema =
            serde_json::from_value(json!({"password": "newpass123", "passwordConfirm": "newpass321"})).unwrap();
        assert!(reset.validate().is_err());
        let reset: ResetPasswordSchema =
            serde_json::from_value(json!({"password": "newpass123", "passwordConfirm": "newpass123"})).unwrap();
        assert!(reset.validate().is_ok());

        let update: UpdatePasswordSchema = serde_json::from_value(
            json!({"passwordCurrent": "test1234", "password": "third1234", "passwordConfirm": "fourth1234"}),
        )
        .unwrap();
        let err: crate::errors::AppError = update.validate().unwrap_err().into();
        assert!(err.message.contains("Passwords are not the same!"));
    }

    #[test]
    fn missing_confirmation_is_a_required_error() {
        let errors = signup(json!({
            "name": "Jonas",
            "email": "jonas@example.com",
            "password": "pass1234"
        }))
        .validate()
        .unwrap_err();
        let err: crate::errors::AppError = errors.into();
        assert_eq!(err.message, "Invalid input data. Please confirm your password");
    }

    #[test]
    fn signup_ignores_a_requested_role() {
        let payload = signup(json!({
            "name": "Mallory",
            "email": "mallory@example.com",
            "password": "pass1234",
            "passwordConfirm": "pass1234",
            "role": "admin"
        }));
        assert!(payload.validate().is_ok());
        assert_eq!(payload.name.as_deref(), Some("Mallory"));
    }

    #[test]
    fn signup_requires_fields() {
        let errors = signup(json!({})).validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn short_passwords_fail() {
        let payload: ResetPasswordSchema =
            serde_json::from_value(json!({"password": "short", "passwordConfirm": "short"})).unwrap();
        assert!(payload.validate().is_err());
    }
}
