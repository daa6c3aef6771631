pub mod auth_middleware;
pub mod proxy;
pub mod rate_limiter;
pub mod security;
pub mod views;
