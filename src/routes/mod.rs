use axum::{extract::DefaultBodyLimit, middleware, routing::MethodRouter};

use crate::middlewares::auth_middleware::{protect, restrict_to};
use crate::models::user::Role;

pub mod booking_routes;
pub mod review_routes;
pub mod tour_routes;
pub mod user_routes;
pub mod view_routes;

pub const ADMIN: &[Role] = &[Role::Admin];
pub const ADMIN_LEAD_GUIDE: &[Role] = &[Role::Admin, Role::LeadGuide];
pub const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];
pub const USER: &[Role] = &[Role::User];
pub const USER_ADMIN: &[Role] = &[Role::User, Role::Admin];

/// JSON and form bodies.
pub const BODY_LIMIT: usize = 10 * 1024;
/// Routes that accept image uploads.
pub const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

/// Requires a logged-in user.
pub fn protected(route: MethodRouter) -> MethodRouter {
    route.route_layer(middleware::from_fn(protect))
}

/// Requires a logged-in user with one of `roles`.
pub fn restricted(route: MethodRouter, roles: &'static [Role]) -> MethodRouter {
    route
        .route_layer(middleware::from_fn_with_state(roles, restrict_to))
        .route_layer(middleware::from_fn(protect))
}

pub fn with_uploads(route: MethodRouter) -> MethodRouter {
    route.layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}
