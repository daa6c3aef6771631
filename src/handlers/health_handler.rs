use crate::errors::AppError;
use crate::state::AppState;
use crate::utils::handler::HandlerResult;
use crate::utils::response::ApiResponse;
use axum::{Extension, Json, http::StatusCode};
use serde_json::json;

pub async fn health(Extension(state): Extension<AppState>) -> HandlerResult {
    // Cheap round trip to the database
    let res: Result<i64, sqlx::Error> = sqlx::query_scalar("SELECT 1").fetch_one(&state.db).await;

    match res {
        Ok(_) => Ok((StatusCode::OK, Json(ApiResponse::success(json!({ "db": "ok" }))))),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            Err(AppError::new(StatusCode::SERVICE_UNAVAILABLE, "Database unavailable").with_details(e.to_string()))
        }
    }
}
