use axum::{
    Extension, Json,
    extract::{Path, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::errors::{AppError, AppResult};
use crate::handlers::factory::parse_body;
use crate::middlewares::auth_middleware::{CurrentUser, JWT_COOKIE, LOGGED_OUT};
use crate::models::resource::Resource;
use crate::models::user::{NewUser, Role, User};
use crate::schemas::auth_schema::{
    ForgotPasswordSchema, LoginSchema, ResetPasswordSchema, SignupSchema, UpdatePasswordSchema,
};
use crate::state::AppState;
use crate::utils::auth::{create_reset_token, hash_password_blocking, hash_reset_token, verify_password_blocking};
use crate::utils::email::Email;
use crate::utils::jwt::create_jwt;
use crate::utils::request::{base_url, is_secure};
use crate::utils::response::ApiResponse;

const RESET_TOKEN_TTL_MINUTES: i64 = 10;

/// Signs a token for `user`, sets it as an httpOnly cookie and returns it in the body.
fn send_token(state: &AppState, user: User, status: StatusCode, headers: &HeaderMap) -> AppResult<Response> {
    let token = create_jwt(user.id, &state.config.jwt_secret, state.config.jwt_expires_in)?;

    let cookie = Cookie::build((JWT_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(is_secure(headers))
        .expires(OffsetDateTime::now_utc() + time::Duration::days(state.config.jwt_cookie_expires_in_days))
        .build();

    let body = ApiResponse::with_token(token, json!({ "user": user }));
    Ok((status, CookieJar::new().add(cookie), Json(body)).into_response())
}

async fn hash(state: &AppState, password: String) -> AppResult<String> {
    hash_password_blocking(password, state.config.bcrypt_cost, Some(10)).await
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn signup(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload?;
    let form: SignupSchema = parse_body(body)?;
    let (Some(name), Some(email), Some(password)) = (form.name, form.email, form.password) else {
        return Err(AppError::bad_request("Please provide name, email and password"));
    };

    let user = User::create(
        &state.db,
        NewUser {
            name: name.trim().to_string(),
            email: normalize_email(&email),
            password_hash: hash(&state, password).await?,
            role: Role::User,
            photo: None,
        },
    )
    .await?;
    tracing::info!(user_id = user.id, "user signed up");

    let url = format!("{}/me", base_url(&headers));
    if let Err(err) = Email::new(&user, url, &state.config.email_from)
        .send_welcome(&state.templates, state.mailer.as_ref())
        .await
    {
        tracing::error!(user_id = user.id, error = %err, "failed to send welcome email");
    }

    send_token(&state, user, StatusCode::CREATED, &headers)
}

pub async fn login(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload?;
    let form: LoginSchema =
        serde_json::from_value(body).map_err(|_| AppError::bad_request("Please provide email and password!"))?;
    let (Some(email), Some(password)) = (form.email, form.password) else {
        return Err(AppError::bad_request("Please provide email and password!"));
    };

    let incorrect = || AppError::unauthorized("Incorrect email or password");
    let user = User::find_active_by_email(&state.db, &normalize_email(&email))
        .await?
        .ok_or_else(incorrect)?;
    let stored = User::password_hash(&state.db, user.id).await?.ok_or_else(incorrect)?;
    if !verify_password_blocking(password, stored, None).await? {
        tracing::warn!(user_id = user.id, "failed login attempt");
        return Err(incorrect());
    }

    send_token(&state, user, StatusCode::OK, &headers)
}

pub async fn logout() -> impl IntoResponse {
    let cookie = Cookie::build((JWT_COOKIE, LOGGED_OUT))
        .path("/")
        .http_only(true)
        .expires(OffsetDateTime::now_utc() + time::Duration::seconds(10))
        .build();
    (StatusCode::OK, CookieJar::new().add(cookie), Json(ApiResponse::empty()))
}

pub async fn forgot_password(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let Json(body) = payload?;
    let form: ForgotPasswordSchema = parse_body(body)?;
    let email = normalize_email(form.email.as_deref().unwrap_or_default());

    let user = User::find_active_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::not_found("There is no user with this email address."))?;

    let (plain, hashed) = create_reset_token();
    let expires = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
    User::set_reset_token(&state.db, user.id, Some(&hashed), Some(expires)).await?;

    let url = format!("{}/api/v1/users/resetPassword/{}", base_url(&headers), plain);
    let sent = Email::new(&user, url, &state.config.email_from)
        .send_password_reset(&state.templates, state.mailer.as_ref())
        .await;
    if let Err(err) = sent {
        tracing::error!(user_id = user.id, error = %err, "failed to send password reset email");
        User::set_reset_token(&state.db, user.id, None, None).await?;
        return Err(AppError::server("There was an error sending the email. Try again later!"));
    }

    Ok(Json(ApiResponse::message("Token sent to email!")))
}

pub async fn reset_password(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let user = User::find_by_reset_token(&state.db, &hash_reset_token(&token))
        .await?
        .ok_or_else(|| AppError::bad_request("Token is invalid or has expired"))?;

    let Json(body) = payload?;
    let form: ResetPasswordSchema = parse_body(body)?;
    let password = form.password.ok_or_else(|| AppError::bad_request("Please provide a password"))?;

    User::set_password(&state.db, user.id, &hash(&state, password).await?).await?;
    tracing::info!(user_id = user.id, "password reset");

    let user = User::find_by_id(&state.db, user.id).await?.ok_or_else(AppError::no_document)?;
    send_token(&state, user, StatusCode::OK, &headers)
}

pub async fn update_my_password(
    Extension(state): Extension<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload?;
    let form: UpdatePasswordSchema = parse_body(body)?;
    let (Some(current), Some(password)) = (form.password_current, form.password) else {
        return Err(AppError::bad_request("Please provide your current and new password"));
    };

    let stored = User::password_hash(&state.db, user.id).await?.ok_or_else(AppError::no_document)?;
    if !verify_password_blocking(current, stored, None).await? {
        return Err(AppError::unauthorized("Your current password is wrong."));
    }

    User::set_password(&state.db, user.id, &hash(&state, password).await?).await?;
    tracing::info!(user_id = user.id, "password changed");

    let user = User::find_by_id(&state.db, user.id).await?.ok_or_else(AppError::no_document)?;
    send_token(&state, user, StatusCode::OK, &headers)
}
