use axum::{
    Extension,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::errors::{AppError, AppResult};
use crate::models::resource::Resource;
use crate::models::user::{Role, User};
use crate::state::AppState;
use crate::utils::jwt::decode_jwt;

pub const JWT_COOKIE: &str = "jwt";
pub const LOGGED_OUT: &str = "loggedout";

/// The authenticated user, set by `protect` and (when a valid cookie is present) `is_logged_in`.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(JWT_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty() && t != LOGGED_OUT)
}

/// Bearer header first, then the `jwt` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

/// Verifies a token and loads the user it was issued for.
pub async fn authenticate(state: &AppState, token: &str) -> AppResult<User> {
    let claims = decode_jwt(token, &state.config.jwt_secret)?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("The user belonging to this token does no longer exist."))?;

    if user.changed_password_after(claims.iat) {
        return Err(AppError::unauthorized("User recently changed password! Please log in again."));
    }
    Ok(user)
}

pub async fn protect(Extension(state): Extension<AppState>, mut req: Request, next: Next) -> AppResult<Response> {
    let token = extract_token(req.headers())
        .ok_or_else(|| AppError::unauthorized("You are not logged in! Please log in to get access."))?;

    let user = authenticate(&state, &token).await?;
    tracing::debug!(user_id = user.id, role = %user.role, "authenticated request");
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Must run after `protect`.
pub async fn restrict_to(State(roles): State<&'static [Role]>, req: Request, next: Next) -> AppResult<Response> {
    let role = req
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| user.role)
        .ok_or_else(|| AppError::unauthorized("You are not logged in! Please log in to get access."))?;

    if !roles.contains(&role) {
        return Err(AppError::forbidden("You do not have permission to perform this action"));
    }
    Ok(next.run(req).await)
}

/// For rendered pages: exposes the user behind a valid `jwt` cookie and never fails.
pub async fn is_logged_in(Extension(state): Extension<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = cookie_token(req.headers()) {
        match authenticate(&state, &token).await {
            Ok(user) => {
                req.extensions_mut().insert(CurrentUser(user));
            }
            Err(err) => tracing::debug!(reason = %err, "ignoring invalid session cookie"),
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("jwt=from-cookie"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn logged_out_cookie_is_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("jwt=loggedout"));
        assert!(extract_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_token(&headers).is_none());
    }
}
