use std::net::{IpAddr, SocketAddr};

use axum::middleware;
use axum::{Router, body::Body, http::Request, routing::get};
use natours::middlewares::proxy::ClientIp;
use natours::middlewares::rate_limiter::{LIMIT_MESSAGE, debug_info, purge_stale_buckets_once, rate_limiter};
use serial_test::serial;
use tower::util::ServiceExt; // brings .oneshot()

fn set_limits(max: &str, window: &str, cost: Option<&str>) {
    unsafe {
        std::env::set_var("RATE_LIMIT_MAX", max);
        std::env::set_var("RATE_LIMIT_WINDOW_SECS", window);
        match cost {
            Some(c) => std::env::set_var("RATE_LIMIT_REQUEST_COST", c),
            None => std::env::remove_var("RATE_LIMIT_REQUEST_COST"),
        }
    }
}

fn app() -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .layer(middleware::from_fn(rate_limiter))
}

fn from_ip(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
#[serial]
async fn blocks_after_the_window_is_spent() {
    set_limits("2", "3600", None);
    purge_stale_buckets_once(0).await;
    let app = app();

    for _ in 0..2 {
        let resp = app.clone().oneshot(from_ip("1.2.3.4")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }

    let resp = app.clone().oneshot(from_ip("1.2.3.4")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 429);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");
    let body = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "fail");
    assert_eq!(v["message"], LIMIT_MESSAGE);

    // Another client has its own bucket
    let resp = app.oneshot(from_ip("4.3.2.1")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["x-ratelimit-limit"], "2");
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "1");
}

#[tokio::test]
#[serial]
async fn request_cost_allows_multiple_quick_requests() {
    set_limits("1", "3600", Some("0.2"));
    purge_stale_buckets_once(0).await;
    let app = app();

    // max=1 and cost=0.2 allow 5 immediate requests
    let mut ok_count = 0;
    for _ in 0..5 {
        let resp = app.clone().oneshot(from_ip("9.9.9.9")).await.unwrap();
        if resp.status().as_u16() == 200 {
            ok_count += 1;
        }
    }
    assert_eq!(ok_count, 5);

    let resp6 = app.oneshot(from_ip("9.9.9.9")).await.unwrap();
    assert_eq!(resp6.status().as_u16(), 429);
}

#[tokio::test]
#[serial]
async fn key_source_prefers_the_resolved_client_ip() {
    set_limits("1000", "3600", None);
    let app = app();

    let mut req = Request::builder()
        .uri("/")
        .header("x-forwarded-for", "7.7.7.7")
        .body(Body::empty())
        .unwrap();
    req.extensions_mut().insert(ClientIp(IpAddr::from([1, 2, 3, 4])));
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.headers()["x-key-source"], "extension");

    let req = Request::builder()
        .uri("/")
        .header("cf-connecting-ip", "5.6.7.8")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.headers()["x-key-source"], "cf-connecting-ip");

    let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
    req.extensions_mut()
        .insert(SocketAddr::new(IpAddr::from([203, 0, 113, 5]), 12345));
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.headers()["x-key-source"], "peer");
}

#[tokio::test]
#[serial]
async fn debug_endpoint_reports_and_purge_clears_buckets() {
    set_limits("1000", "3600", None);
    unsafe {
        std::env::set_var("RATE_LIMIT_DEBUG", "true");
        std::env::set_var("RATE_LIMIT_DEBUG_TOKEN", "testtoken");
    }
    purge_stale_buckets_once(0).await;

    let app = app();
    app.clone().oneshot(from_ip("1.2.3.4")).await.unwrap();
    app.oneshot(from_ip("2.2.2.2")).await.unwrap();

    let dbg = Router::new().route("/debug/rate_limiter", get(debug_info));
    let debug_request = |token: &str| {
        Request::builder()
            .uri("/debug/rate_limiter")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    };

    let resp = dbg.clone().oneshot(debug_request("wrong")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = dbg.clone().oneshot(debug_request("testtoken")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(v["buckets"].as_u64().unwrap() >= 2);

    // ttl=0 removes everything idle for 0s or more
    purge_stale_buckets_once(0).await;
    let resp = dbg.oneshot(debug_request("testtoken")).await.unwrap();
    let body = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["buckets"].as_u64().unwrap(), 0);

    unsafe {
        std::env::remove_var("RATE_LIMIT_DEBUG");
        std::env::remove_var("RATE_LIMIT_DEBUG_TOKEN");
    }
}
