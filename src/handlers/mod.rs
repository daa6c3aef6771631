pub mod auth_handler;
pub mod booking_handler;
pub mod factory;
pub mod health_handler;
pub mod review_handler;
pub mod tour_handler;
pub mod user_handler;
pub mod view_handler;
