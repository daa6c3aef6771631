use axum::{Extension, Json, http::StatusCode};
use chrono::Utc;
use serde_json::json;

use crate::errors::{AppError, AppResult};
use crate::handlers::factory::{document_response, find_document};
use crate::middlewares::auth_middleware::CurrentUser;
use crate::models::user::User;
use crate::schemas::user_schema::UpdateMeSchema;
use crate::state::AppState;
use crate::utils::form::FormPayload;
use crate::utils::handler::HandlerResult;
use crate::utils::images::{USER_PHOTO_SIZE, ensure_image, save_resized, users_dir};
use crate::utils::response::ApiResponse;
use crate::utils::validation::validate_payload;

pub async fn get_me(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> HandlerResult {
    let me = find_document::<User>(&state.db, user.id).await?;
    document_response(StatusCode::OK, me)
}

/// Updates name, email and photo of the logged-in user. Accepts JSON or multipart.
pub async fn update_me(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: FormPayload,
) -> HandlerResult {
    if payload.has_any(&["password", "passwordConfirm"]) {
        return Err(AppError::bad_request(
            "This route is not for password updates. Please use /updateMyPassword.",
        ));
    }

    let form: UpdateMeSchema = payload.parse()?;
    validate_payload(&form)?;

    let photo = match payload.files_named("photo").next() {
        Some(file) => {
            ensure_image(file.content_type.as_deref())?;
            let filename = format!("user-{}-{}.jpeg", user.id, Utc::now().timestamp_millis());
            Some(
                save_resized(
                    file.bytes.to_vec(),
                    USER_PHOTO_SIZE,
                    users_dir(&state.config.public_dir),
                    filename,
                )
                .await?,
            )
        }
        None => None,
    };

    let updated = User::update_profile(
        &state.db,
        user.id,
        form.name.as_deref().map(str::trim),
        form.email.as_deref(),
        photo.as_deref(),
    )
    .await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(json!({ "user": updated })))))
}

pub async fn delete_me(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<StatusCode> {
    User::deactivate(&state.db, user.id).await?;
    tracing::info!(user_id = user.id, "user deactivated their account");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_user() -> AppResult<StatusCode> {
    Err(AppError::server("This route is not defined! Please use /signup instead"))
}
