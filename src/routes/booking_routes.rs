use axum::{Router, routing::get};

use crate::handlers::booking_handler::get_checkout_session;
use crate::handlers::factory;
use crate::models::booking::Booking;
use crate::routes::{ADMIN_LEAD_GUIDE, protected, restricted};

pub fn booking_routes() -> Router {
    Router::new()
        .route("/checkout-session/{id}", protected(get(get_checkout_session)))
        .route(
            "/",
            restricted(
                get(factory::index::<Booking>).post(factory::store::<Booking>),
                ADMIN_LEAD_GUIDE,
            ),
        )
        .route(
            "/{id}",
            restricted(
                get(factory::show::<Booking>)
                    .patch(factory::update::<Booking>)
                    .delete(factory::destroy::<Booking>),
                ADMIN_LEAD_GUIDE,
            ),
        )
}
