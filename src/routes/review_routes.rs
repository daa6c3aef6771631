use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::handlers::factory;
use crate::handlers::review_handler::store;
use crate::models::review::Review;
use crate::routes::{USER, USER_ADMIN, protected, restricted};

pub fn review_routes() -> Router {
    Router::new()
        .route(
            "/",
            protected(get(factory::index::<Review>)).merge(restricted(post(store), USER)),
        )
        .route(
            "/{id}",
            protected(get(factory::show::<Review>)).merge(restricted(
                patch(factory::update::<Review>).delete(factory::destroy::<Review>),
                USER_ADMIN,
            )),
        )
}
