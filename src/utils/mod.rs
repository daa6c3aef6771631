pub mod api_features;
pub mod auth;
pub mod email;
pub mod form;
pub mod handler;
pub mod images;
pub mod jwt;
pub mod request;
pub mod response;
pub mod stripe;
pub mod templates;
pub mod validation;
