//! CRUD handlers shared by every resource.
//!
//! Each handler is generic over a [`Resource`]; routes instantiate them
//! directly, e.g. `get(factory::index::<Tour>)`. The `*_document` functions
//! hold the actual work so resource-specific handlers can reuse it after
//! adjusting the payload.

use axum::{
    Extension, Json,
    extract::{Path, Query, rejection::JsonRejection},
    http::StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::models::resource::{Creatable, Resource};
use crate::state::AppState;
use crate::utils::api_features::ApiFeatures;
use crate::utils::handler::{HandlerResult, parse_id};
use crate::utils::response::ApiResponse;
use crate::utils::validation::validate_payload;

/// Deserializes a request body into `T` and runs its validators.
pub fn parse_body<T: DeserializeOwned + Validate>(value: Value) -> AppResult<T> {
    let payload: T =
        serde_json::from_value(value).map_err(|e| AppError::bad_request(format!("Invalid input data. {}", e)))?;
    validate_payload(&payload)?;
    Ok(payload)
}

/// Lists documents with the query features applied. `parent` restricts the
/// listing to children of one record (`("tour_id", 5)`).
pub async fn list_documents<R: Resource>(
    db: &MySqlPool,
    pairs: &[(String, String)],
    parent: Option<(&'static str, i64)>,
) -> HandlerResult {
    let features = ApiFeatures::parse(pairs, R::COLUMNS)?;
    let docs = R::find_many(db, &features, parent).await?;

    let docs = docs
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::internal(format!("failed to serialize {}: {}", R::TABLE, e)))?;
    let docs = features.project(docs);

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success_with_results(docs.len(), json!({ "data": docs }))),
    ))
}

pub async fn find_document<R: Resource>(db: &MySqlPool, id: i64) -> AppResult<R> {
    R::find_one_populated(db, id).await?.ok_or_else(AppError::no_document)
}

pub async fn create_document<R: Creatable>(db: &MySqlPool, body: Value) -> AppResult<R> {
    let payload: R::Create = parse_body(body)?;
    let id = R::insert(db, payload).await?;
    tracing::info!(table = R::TABLE, id, "document created");
    R::find_written(db, id).await?.ok_or_else(AppError::no_document)
}

pub async fn update_document<R: Resource>(db: &MySqlPool, id: i64, body: Value) -> AppResult<R> {
    let payload: R::Update = parse_body(body)?;
    if !R::apply_update(db, id, payload).await? {
        return Err(AppError::no_document());
    }
    R::find_written(db, id).await?.ok_or_else(AppError::no_document)
}

pub async fn delete_document<R: Resource>(db: &MySqlPool, id: i64) -> AppResult<()> {
    if !R::remove(db, id).await? {
        return Err(AppError::no_document());
    }
    tracing::info!(table = R::TABLE, id, "document deleted");
    Ok(())
}

pub fn document_response<T: serde::Serialize>(status: StatusCode, doc: T) -> HandlerResult {
    Ok((status, Json(ApiResponse::success(json!({ "data": doc })))))
}

pub async fn index<R: Resource>(
    Extension(state): Extension<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> HandlerResult {
    list_documents::<R>(&state.db, &pairs, None).await
}

pub async fn show<R: Resource>(Extension(state): Extension<AppState>, Path(id): Path<String>) -> HandlerResult {
    let doc = find_document::<R>(&state.db, parse_id(&id)?).await?;
    document_response(StatusCode::OK, doc)
}

pub async fn store<R: Creatable>(
    Extension(state): Extension<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult {
    let Json(body) = payload?;
    let doc = create_document::<R>(&state.db, body).await?;
    document_response(StatusCode::CREATED, doc)
}

pub async fn update<R: Resource>(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HandlerResult {
    let Json(body) = payload?;
    let doc = update_document::<R>(&state.db, parse_id(&id)?, body).await?;
    document_response(StatusCode::OK, doc)
}

pub async fn destroy<R: Resource>(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    delete_document::<R>(&state.db, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
