pub mod booking;
pub mod resource;
pub mod review;
pub mod tour;
pub mod user;
