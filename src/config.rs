use std::time::Duration;

use thiserror::Error;

pub mod database;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set. Copy `.env.example` to `.env` and fill it in, or export it in your environment")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

/// Runtime configuration read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub env: AppEnv,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub jwt_cookie_expires_in_days: i64,
    pub bcrypt_cost: u32,
    pub email_from: String,
    pub smtp: Option<SmtpConfig>,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub public_dir: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let expires_raw = var_or("JWT_EXPIRES_IN", "90d");
        let jwt_expires_in = parse_duration(&expires_raw).ok_or(ConfigError::Invalid {
            key: "JWT_EXPIRES_IN",
            value: expires_raw,
        })?;

        let smtp = std::env::var("EMAIL_HOST").ok().filter(|h| !h.trim().is_empty()).map(|host| SmtpConfig {
            host,
            port: parse_or("EMAIL_PORT", 25),
            username: var_or("EMAIL_USERNAME", ""),
            password: var_or("EMAIL_PASSWORD", ""),
        });

        Ok(Self {
            env: app_env(),
            host: var_or("APP_HOST", "127.0.0.1"),
            port: parse_or("APP_PORT", 3000),
            jwt_secret,
            jwt_expires_in,
            jwt_cookie_expires_in_days: parse_or("JWT_COOKIE_EXPIRES_IN", 90),
            bcrypt_cost: parse_or("BCRYPT_COST", 12),
            email_from: var_or("EMAIL_FROM", "hello@natours.io"),
            smtp,
            stripe_secret_key: var_or("STRIPE_SECRET_KEY", ""),
            stripe_webhook_secret: var_or("STRIPE_WEBHOOK_SECRET", ""),
            stripe_api_base: var_or("STRIPE_API_BASE", "https://api.stripe.com"),
            public_dir: var_or("PUBLIC_DIR", "public"),
        })
    }
}

/// Environment mode, read on every call so tests can flip it.
pub fn app_env() -> AppEnv {
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => AppEnv::Production,
        _ => AppEnv::Development,
    }
}

pub fn is_development() -> bool {
    app_env() == AppEnv::Development
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Parses `90d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (number, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], c),
        _ => (raw, 's'),
    };
    let value: u64 = number.trim().parse().ok()?;
    let secs = match unit {
        's' => value,
        'm' => value * 60,
        'h' => value * 60 * 60,
        'd' => value * 24 * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_suffixes() {
        assert_eq!(parse_duration("90d"), Some(Duration::from_secs(90 * 86_400)));
        assert_eq!(parse_duration("12h"), Some(Duration::from_secs(12 * 3_600)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1_800)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration(""), None);
    }
}
