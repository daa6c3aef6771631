use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::handlers::factory;
use crate::handlers::review_handler;
use crate::handlers::tour_handler::{
    alias_top_tours, distances, monthly_plan, tour_stats, tours_within, update_tour,
};
use crate::models::tour::Tour;
use crate::routes::{ADMIN_LEAD_GUIDE, STAFF, USER, protected, restricted, with_uploads};

pub fn tour_routes() -> Router {
    Router::new()
        .route("/top-5-tours", get(alias_top_tours))
        .route("/tour-stats", get(tour_stats))
        .route("/monthly-plan/{year}", restricted(get(monthly_plan), STAFF))
        .route(
            "/tours-within/{distance}/center/{latlng}/unit/{unit}",
            get(tours_within),
        )
        .route("/distances/{latlng}/unit/{unit}", get(distances))
        .route(
            "/",
            get(factory::index::<Tour>).merge(restricted(post(factory::store::<Tour>), ADMIN_LEAD_GUIDE)),
        )
        .route(
            "/{id}",
            get(factory::show::<Tour>).merge(restricted(
                with_uploads(patch(update_tour)).delete(factory::destroy::<Tour>),
                ADMIN_LEAD_GUIDE,
            )),
        )
        // Reviews of one tour
        .route(
            "/{id}/reviews",
            protected(get(review_handler::index_for_tour))
                .merge(restricted(post(review_handler::store_for_tour), USER)),
        )
}
