use axum::{
    Extension, Json,
    extract::{Path, Query},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::{Value, json};

use crate::errors::{AppError, AppResult};
use crate::handlers::factory::{document_response, list_documents, update_document};
use crate::models::tour::{DistanceUnit, Tour, parse_latlng};
use crate::state::AppState;
use crate::utils::api_features::override_pairs;
use crate::utils::form::{FormPayload, UploadedFile};
use crate::utils::handler::{HandlerResult, parse_id};
use crate::utils::images::{TOUR_IMAGE_SIZE, ensure_image, save_resized, tours_dir};
use crate::utils::response::ApiResponse;

const MAX_TOUR_IMAGES: usize = 3;

/// `top-5-tours`: the best rated, cheapest first on ties.
pub async fn alias_top_tours(
    Extension(state): Extension<AppState>,
    Query(mut pairs): Query<Vec<(String, String)>>,
) -> HandlerResult {
    override_pairs(
        &mut pairs,
        &[
            ("limit", "5"),
            ("sort", "-ratingsAverage,price"),
            ("fields", "name,price,ratingsAverage,summary,difficulty"),
        ],
    );
    list_documents::<Tour>(&state.db, &pairs, None).await
}

pub async fn tour_stats(Extension(state): Extension<AppState>) -> HandlerResult {
    let stats = Tour::stats(&state.db).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(json!({ "stats": stats })))))
}

pub async fn monthly_plan(Extension(state): Extension<AppState>, Path(year): Path<String>) -> HandlerResult {
    let year: i32 = year
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("Invalid year: {}", year)))?;
    let plan = Tour::monthly_plan(&state.db, year).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::success_with_results(plan.len(), json!({ "plan": plan }))),
    ))
}

/// `/tours-within/{distance}/center/{latlng}/unit/{unit}`
pub async fn tours_within(
    Extension(state): Extension<AppState>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> HandlerResult {
    let distance: f64 = distance
        .trim()
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| AppError::bad_request(format!("Invalid distance: {}", distance)))?;
    let center = parse_latlng(&latlng)?;

    let tours = Tour::within(&state.db, distance, center, DistanceUnit::parse(&unit)).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::success_with_results(tours.len(), json!({ "data": tours }))),
    ))
}

/// `/distances/{latlng}/unit/{unit}`
pub async fn distances(
    Extension(state): Extension<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> HandlerResult {
    let point = parse_latlng(&latlng)?;
    let distances = Tour::distances(&state.db, point, DistanceUnit::parse(&unit)).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(json!({ "data": distances })))))
}

/// Resizes the cover and gallery uploads and returns the stored file names.
/// Uploads are only processed when both a cover and gallery images are present.
async fn store_tour_images(state: &AppState, id: i64, payload: &FormPayload) -> AppResult<Option<(String, Vec<String>)>> {
    let cover: Vec<&UploadedFile> = payload.files_named("imageCover").collect();
    let gallery: Vec<&UploadedFile> = payload.files_named("images").collect();
    if cover.is_empty() || gallery.is_empty() {
        return Ok(None);
    }
    if cover.len() > 1 || gallery.len() > MAX_TOUR_IMAGES {
        return Err(AppError::bad_request("Too many files uploaded"));
    }
    for file in cover.iter().chain(gallery.iter()) {
        ensure_image(file.content_type.as_deref())?;
    }

    let dir = tours_dir(&state.config.public_dir);
    let stamp = Utc::now().timestamp_millis();

    let cover_name = save_resized(
        cover[0].bytes.to_vec(),
        TOUR_IMAGE_SIZE,
        dir.clone(),
        format!("tour-{}-{}-cover.jpeg", id, stamp),
    )
    .await?;

    let mut images = Vec::with_capacity(gallery.len());
    for (i, file) in gallery.iter().enumerate() {
        let name = format!("tour-{}-{}-{}.jpeg", id, stamp, i + 1);
        images.push(save_resized(file.bytes.to_vec(), TOUR_IMAGE_SIZE, dir.clone(), name).await?);
    }

    Ok(Some((cover_name, images)))
}

/// Partial update accepting JSON or multipart with `imageCover` and `images` files.
pub async fn update_tour(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    payload: FormPayload,
) -> HandlerResult {
    let id = parse_id(&id)?;

    let mut fields = payload.fields.clone();
    if let Some((cover, images)) = store_tour_images(&state, id, &payload).await? {
        fields.insert("imageCover".into(), Value::String(cover));
        fields.insert("images".into(), json!(images));
    }

    let tour = update_document::<Tour>(&state.db, id, Value::Object(fields)).await?;
    document_response(StatusCode::OK, tour)
}
