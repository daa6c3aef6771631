pub mod auth_schema;
pub mod booking_schema;
pub mod review_schema;
pub mod tour_schema;
pub mod user_schema;
