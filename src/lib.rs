pub mod config;
pub mod errors;
pub mod routes;
pub mod handlers;
pub mod schemas;
pub mod utils;
pub mod middlewares;
pub mod models;
pub mod state;

pub mod app;
pub mod test_helpers;

pub use app::create_app;
pub use state::AppState;
