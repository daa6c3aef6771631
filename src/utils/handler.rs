use crate::errors::AppError;
use crate::utils::response::ApiResponse;
use axum::{Json, http::StatusCode};

/// Generic handler result type used across HTTP handlers to simplify signatures.
///
/// Default payload type is `serde_json::Value` for flexibility.
pub type HandlerResult<T = serde_json::Value> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;

/// Parses a path id, mapping garbage to a 400 like any other cast failure.
pub fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::bad_request(format!("Invalid id: {}", raw)))
}
