use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{FormRejection, JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config;

pub type AppResult<T> = Result<T, AppError>;

/// Error raised anywhere in the request pipeline.
///
/// Operational errors carry a message that is safe to show to clients.
/// Everything else is treated as a bug: it is logged and, in production,
/// replaced by a generic message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub operational: bool,
    pub details: Option<String>,
    pub errors: Option<Value>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            operational: true,
            details: None,
            errors: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// An operational 500, e.g. a failed email delivery the client should know about.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// A programming or infrastructure failure.
    pub fn internal(details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Something went very wrong!".to_string(),
            operational: false,
            details: Some(details.into()),
            errors: None,
        }
    }

    pub fn no_document() -> Self {
        Self::not_found("No document found with that ID")
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// `fail` for client errors, `error` for server errors.
    pub fn status_text(&self) -> &'static str {
        if self.status.is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    /// Message that may be shown to the client in the current environment.
    pub fn public_message(&self) -> String {
        if self.operational || config::is_development() {
            self.message.clone()
        } else {
            "Something went very wrong!".to_string()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !self.operational {
            tracing::error!(
                status = self.status.as_u16(),
                details = self.details.as_deref().unwrap_or(""),
                "ERROR: {}",
                self.message
            );
        }

        let mut body = json!({
            "status": self.status_text(),
            "message": self.public_message(),
        });
        if let Some(errors) = &self.errors {
            body["errors"] = errors.clone();
        }
        if config::is_development() {
            if let Some(details) = &self.details {
                body["details"] = json!(details);
            }
        }

        let mut response = (self.status, Json(body)).into_response();
        // Rendered pages swap the JSON body for an HTML error page.
        response.extensions_mut().insert(self);
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => return AppError::no_document(),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                match db_err.code().as_deref() {
                    // Duplicate entry 'x' for key 'y'
                    Some("1062") => {
                        let value = msg.split('\'').nth(1).unwrap_or("").to_string();
                        return AppError::bad_request(format!(
                            "Duplicate field value: '{}'. Please use another value!",
                            value
                        ));
                    }
                    Some("1452") => {
                        return AppError::bad_request(
                            "Invalid reference: the related document does not exist",
                        )
                        .with_details(msg);
                    }
                    _ => {}
                }
                if msg.to_lowercase().contains("duplicate") {
                    return AppError::bad_request("Duplicate field value. Please use another value!");
                }
            }
            _ => {}
        }
        AppError::internal(format!("database error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => {
                AppError::unauthorized("Your token has expired! Please log in again.")
            }
            _ => AppError::unauthorized("Invalid token. Please log in again!")
                .with_details(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        let mut errors_map = serde_json::Map::new();

        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        for (field, errs) in fields {
            for e in errs.iter() {
                let msg = e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}", field));
                // Struct-level checks land under `__all__`; their code names the field.
                let key = if field == "__all__" { e.code.to_string() } else { field.to_string() };
                messages.push(msg.clone());
                match errors_map.entry(key).or_insert_with(|| json!([])) {
                    Value::Array(list) => list.push(json!(msg)),
                    other => *other = json!([msg]),
                }
            }
        }

        let mut error = AppError::bad_request(format!("Invalid input data. {}", messages.join(". ")));
        error.errors = Some(Value::Object(errors_map));
        error
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(rejection.status(), format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::new(rejection.status(), format!("Invalid form data: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), format!("Invalid multipart data: {}", err.body_text()))
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::new(rejection.status(), format!("Invalid multipart data: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        AppError::internal(format!("template error: {:#}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::internal(format!("upstream request failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::internal(format!("background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Deserialize, Validate)]
    struct Payload {
        #[validate(length(min = 1, message = "Name cannot be empty"))]
        name: String,
        #[validate(email(message = "Please provide a valid email"))]
        email: String,
    }

    #[test]
    fn client_errors_are_fail_and_server_errors_are_error() {
        assert_eq!(AppError::bad_request("x").status_text(), "fail");
        assert_eq!(AppError::not_found("x").status_text(), "fail");
        assert_eq!(AppError::internal("boom").status_text(), "error");
        assert_eq!(AppError::server("mail down").status_text(), "error");
    }

    #[test]
    fn validation_errors_join_messages() {
        let payload = Payload { name: "".into(), email: "nope".into() };
        let err: AppError = payload.validate().unwrap_err().into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            err.message,
            "Invalid input data. Please provide a valid email. Name cannot be empty"
        );
        let errors = err.errors.unwrap();
        assert!(errors["name"].is_array());
        assert!(errors["email"].is_array());
    }

    #[test]
    fn internal_errors_are_not_operational() {
        let err = AppError::internal("connection reset");
        assert!(!err.operational);
        assert_eq!(err.message, "Something went very wrong!");
        assert_eq!(err.details.as_deref(), Some("connection reset"));
    }

    #[test]
    fn expired_tokens_map_to_unauthorized() {
        let err: AppError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature).into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "Your token has expired! Please log in again.");

        let err: AppError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature).into();
        assert_eq!(err.message, "Invalid token. Please log in again!");
    }

    #[test]
    fn row_not_found_is_404() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
