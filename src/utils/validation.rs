use validator::{Validate, ValidationError};

use crate::errors::AppError;

/// Validate a payload implementing `validator::Validate` and convert failures
/// into an `AppError` so handlers can `?` it.
pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload.validate().map_err(AppError::from)
}

pub fn error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(error("blank", "Value cannot be blank"));
    }
    Ok(())
}
