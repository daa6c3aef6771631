use axum::{
    Extension, Json,
    extract::{Path, Query, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::errors::{AppError, AppResult};
use crate::handlers::factory::{create_document, document_response, list_documents};
use crate::middlewares::auth_middleware::CurrentUser;
use crate::models::review::Review;
use crate::state::AppState;
use crate::utils::handler::{HandlerResult, parse_id};

/// Fills `tour` from the nested route and `user` from the session when the body omits them.
fn set_tour_user_ids(body: Value, tour_id: Option<i64>, user_id: i64) -> AppResult<Value> {
    let Value::Object(mut map) = body else {
        return Err(AppError::bad_request("Request body must be a JSON object"));
    };
    if let Some(tour_id) = tour_id {
        if map.get("tour").is_none_or(Value::is_null) {
            map.insert("tour".into(), json!(tour_id));
        }
    }
    if map.get("user").is_none_or(Value::is_null) {
        map.insert("user".into(), json!(user_id));
    }
    Ok(Value::Object(map))
}

/// `GET /tours/{id}/reviews`
pub async fn index_for_tour(
    Extension(state): Extension<AppState>,
    Path(tour_id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> HandlerResult {
    let tour_id = parse_id(&tour_id)?;
    list_documents::<Review>(&state.db, &pairs, Some(("tour_id", tour_id))).await
}

async fn create_review(state: &AppState, user_id: i64, tour_id: Option<i64>, body: Value) -> HandlerResult {
    let body = set_tour_user_ids(body, tour_id, user_id)?;
    let review = create_document::<Review>(&state.db, body).await?;
    document_response(StatusCode::CREATED, review)
}

/// `POST /reviews`
pub async fn store(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult {
    let Json(body) = payload?;
    create_review(&state, user.id, None, body).await
}

/// `POST /tours/{id}/reviews`
pub async fn store_for_tour(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(tour_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult {
    let tour_id = parse_id(&tour_id)?;
    let Json(body) = payload?;
    create_review(&state, user.id, Some(tour_id), body).await
}
