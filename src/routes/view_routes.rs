use axum::{
    Router, middleware,
    routing::{MethodRouter, get, post},
};

use crate::handlers::view_handler::{account, login_form, my_tours, overview, submit_user_data, tour};
use crate::middlewares::auth_middleware::is_logged_in;
use crate::middlewares::views::{alerts, render_errors};
use crate::routes::protected;

fn with_session(route: MethodRouter) -> MethodRouter {
    route.route_layer(middleware::from_fn(is_logged_in))
}

/// Server-rendered pages. Errors raised here are rendered as HTML.
pub fn view_routes() -> Router {
    Router::new()
        .route("/", with_session(get(overview)))
        .route("/tour/{slug}", with_session(get(tour)))
        .route("/login", with_session(get(login_form)))
        .route("/me", protected(get(account)))
        .route("/my-tours", protected(get(my_tours)))
        .route("/submit-user-data", protected(post(submit_user_data)))
        .layer(middleware::from_fn(alerts))
        .layer(middleware::from_fn(render_errors))
}
