use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    http::{HeaderValue, Method, Uri},
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config;
use crate::errors::AppError;
use crate::handlers::{booking_handler::webhook_checkout, health_handler::health};
use crate::middlewares::{proxy::proxy_middleware, rate_limiter, security::security_headers};
use crate::routes::{
    BODY_LIMIT, booking_routes::booking_routes, review_routes::review_routes, tour_routes::tour_routes,
    user_routes::user_routes, view_routes::view_routes,
};
use crate::state::AppState;

async fn not_found(uri: Uri) -> AppError {
    let original = uri.path_and_query().map(|p| p.as_str()).unwrap_or_else(|| uri.path());
    AppError::not_found(format!("Can't find {} on this server!", original))
}

fn cors_layer() -> Option<CorsLayer> {
    let cors_allowed = std::env::var("CORS_ALLOWED_ORIGINS").ok();
    let enable_cors = std::env::var("ENABLE_CORS").map(|v| v == "true" || v == "1").unwrap_or(false);
    if !enable_cors && cors_allowed.is_none() {
        return None;
    }

    let methods = [Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS];
    // "*" (or no list) is permissive; anything else is a CSV of origins.
    let origin = match cors_allowed.as_deref().map(str::trim) {
        None | Some("*") => AllowOrigin::any(),
        Some(list) => AllowOrigin::list(list.split(',').filter_map(|s| s.trim().parse::<HeaderValue>().ok())),
    };
    Some(CorsLayer::new().allow_origin(origin).allow_methods(methods).allow_headers(Any))
}

pub fn build_router(public_dir: &str) -> Router {
    let api = Router::new()
        .nest("/api/v1/tours", tour_routes())
        .nest("/api/v1/users", user_routes())
        .nest("/api/v1/reviews", review_routes())
        .nest("/api/v1/bookings", booking_routes())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        // Per-IP limit for the API only
        .layer(middleware::from_fn(rate_limiter::rate_limiter));

    let static_files = ServeDir::new(public_dir).fallback(not_found.into_service());

    let mut app = Router::new()
        // Stripe signs the raw body, so this stays outside the JSON routes.
        .route("/webhook-checkout", post(webhook_checkout))
        .route("/health", get(health))
        .merge(view_routes())
        .merge(api)
        .fallback_service(static_files);

    app = security_headers(app);

    if let Some(cors) = cors_layer() {
        app = app.layer(cors);
    }

    if config::is_development() {
        app = app.layer(TraceLayer::new_for_http());
    }

    // Outermost, so the rate limiter sees the resolved `ClientIp`
    app = app.layer(middleware::from_fn(proxy_middleware));

    if std::env::var("RATE_LIMIT_DEBUG").map(|v| v == "true").unwrap_or(false) {
        app = app.route("/debug/rate_limiter", get(rate_limiter::debug_info));
    }

    app
}

pub fn create_app(state: AppState) -> Router {
    build_router(&state.config.public_dir).layer(Extension(state))
}
