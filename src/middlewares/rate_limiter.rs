use axum::{
    Json,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::errors::AppError;
use crate::middlewares::proxy::ClientIp;

pub const LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again in an hour!";

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

static BUCKETS: Lazy<DashMap<String, Mutex<Bucket>>> = Lazy::new(DashMap::new);

/// Limits read from the environment on every request so they can be tuned without a restart.
#[derive(Debug, Clone, Copy)]
struct Limits {
    max: f64,
    window_secs: f64,
    cost: f64,
}

impl Limits {
    fn from_env() -> Self {
        let max = env_f64("RATE_LIMIT_MAX").filter(|v| *v > 0.0).unwrap_or(100.0);
        let window_secs = env_f64("RATE_LIMIT_WINDOW_SECS").filter(|v| *v > 0.0).unwrap_or(3600.0);
        let cost = env_f64("RATE_LIMIT_REQUEST_COST").filter(|v| *v > 0.0).unwrap_or(1.0);
        Self { max, window_secs, cost }
    }

    fn refill_per_sec(&self) -> f64 {
        self.max / self.window_secs
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<f64>().ok())
}

/// Resolves the client key and names the source it came from (sent back as `x-key-source`).
fn client_key(req: &Request) -> (String, &'static str) {
    if let Some(ClientIp(ip)) = req.extensions().get::<ClientIp>() {
        return (ip.to_string(), "extension");
    }
    let headers = req.headers();
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return (ip.to_string(), "cf-connecting-ip");
    }
    if let Some(ip) = header_str(headers, "x-forwarded-for").and_then(|v| v.split(',').next()) {
        let ip = ip.trim();
        if !ip.is_empty() {
            return (ip.to_string(), "x-forwarded-for");
        }
    }
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return (ip.to_string(), "x-real-ip");
    }
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return (addr.ip().to_string(), "peer");
    }
    if let Some(addr) = req.extensions().get::<SocketAddr>() {
        return (addr.ip().to_string(), "peer");
    }
    ("unknown".to_string(), "unknown")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Token bucket per client IP: `RATE_LIMIT_MAX` requests per `RATE_LIMIT_WINDOW_SECS`.
pub async fn rate_limiter(req: Request, next: Next) -> Response {
    let limits = Limits::from_env();
    let (key, source) = client_key(&req);

    let now = Instant::now();
    let (allowed, remaining) = {
        let entry = BUCKETS.entry(key.clone()).or_insert_with(|| {
            Mutex::new(Bucket {
                tokens: limits.max,
                last_refill: now,
                last_seen: now,
            })
        });
        let mut bucket = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * limits.refill_per_sec()).min(limits.max);
        bucket.last_refill = now;
        bucket.last_seen = now;

        // Small epsilon so fractional costs add up to whole requests.
        if bucket.tokens + 1e-9 >= limits.cost {
            bucket.tokens = (bucket.tokens - limits.cost).max(0.0);
            (true, bucket.tokens)
        } else {
            (false, bucket.tokens)
        }
    };

    let mut response = if allowed {
        next.run(req).await
    } else {
        tracing::warn!(key = %key, source, "rate limit exceeded");
        AppError::new(StatusCode::TOO_MANY_REQUESTS, LIMIT_MESSAGE).into_response()
    };

    let headers = response.headers_mut();
    headers.insert("x-key-source", HeaderValue::from_static(source));
    if let Ok(v) = HeaderValue::from_str(&format!("{}", limits.max as u64)) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&format!("{}", (remaining / limits.cost).floor() as u64)) {
        headers.insert("x-ratelimit-remaining", v);
    }
    response
}

/// Drops buckets idle for longer than `ttl_secs`.
pub async fn purge_stale_buckets_once(ttl_secs: u64) {
    let ttl = Duration::from_secs(ttl_secs);
    let now = Instant::now();
    let mut stale = Vec::new();
    for entry in BUCKETS.iter() {
        // A bucket locked by an in-flight request is in use, so it is not stale.
        if let Ok(bucket) = entry.value().try_lock() {
            if now.duration_since(bucket.last_seen) >= ttl {
                stale.push(entry.key().clone());
            }
        }
    }
    for key in &stale {
        BUCKETS.remove(key);
    }
    if !stale.is_empty() {
        tracing::debug!(removed = stale.len(), "purged stale rate limiter buckets");
    }
}

/// Periodically purges idle buckets (`RATE_LIMIT_BUCKET_TTL_SECS`, default one hour).
pub fn spawn_bucket_purger() -> tokio::task::JoinHandle<()> {
    let ttl = std::env::var("RATE_LIMIT_BUCKET_TTL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(3600);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(ttl.clamp(1, 300)));
        loop {
            interval.tick().await;
            purge_stale_buckets_once(ttl).await;
        }
    })
}

/// Bucket count for operators. Enabled by `RATE_LIMIT_DEBUG=true`; when
/// `RATE_LIMIT_DEBUG_TOKEN` is set the caller must present it as a bearer token.
pub async fn debug_info(headers: HeaderMap) -> Response {
    let enabled = std::env::var("RATE_LIMIT_DEBUG").map(|v| v == "true").unwrap_or(false);
    if !enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    if let Ok(token) = std::env::var("RATE_LIMIT_DEBUG_TOKEN") {
        let presented = header_str(&headers, "authorization").and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(token.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let limits = Limits::from_env();
    Json(json!({
        "buckets": BUCKETS.len(),
        "max": limits.max,
        "windowSecs": limits.window_secs,
        "requestCost": limits.cost,
    }))
    .into_response()
}
