//! HTTP surface: admission layer and playback control endpoints

mod helpers;

use axum::extract::ConnectInfo;
use axum::http::{Method, StatusCode};
use helpers::{connect, header_u32, limits, make_request, test_context};
use laud_common::config::{FailMode, RateLimitConfig};
use laud_gw::api::build_router;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const PEER: &str = "203.0.113.20:41000";

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_limit_headers_count_down_then_429() {
    let app = build_router(test_context(limits(5)));

    for expected in [4, 3, 2, 1] {
        let response = make_request(&app, Method::GET, "/health", None, Some(PEER)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(header_u32(&response.headers, "x-rate-limit"), Some(5));
        assert_eq!(
            header_u32(&response.headers, "x-rate-limit-remaining"),
            Some(expected)
        );
    }

    let response = make_request(&app, Method::GET, "/health", None, Some(PEER)).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_u32(&response.headers, "x-rate-limit-remaining"), Some(0));
    assert_eq!(response.body.unwrap()["error"], "rate_limited");

    // Still blocked, and another client is unaffected
    let response = make_request(&app, Method::GET, "/health", None, Some(PEER)).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    let response =
        make_request(&app, Method::GET, "/health", None, Some("198.51.100.4:1000")).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_blocked_client_never_reaches_handler() {
    let ctx = test_context(limits(1));
    let (session, mut remote) = connect("desk");
    ctx.registry.insert(session).await;
    let app = build_router(ctx);

    let response = make_request(&app, Method::POST, "/elixir/desk/pause", None, Some(PEER)).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // Nothing was written to the client
    assert!(remote.outbound.try_next().is_err());
}

#[tokio::test]
async fn test_cors_preflight_is_counted() {
    let ctx = test_context(limits(2));
    let admission = ctx.admission.clone();
    let app = build_router(ctx);

    let preflight = || {
        let mut request = axum::http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/health")
            .header("origin", "https://laudiolin.seikimo.moe")
            .header("access-control-request-method", "GET")
            .body(axum::body::Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(PEER.parse::<SocketAddr>().unwrap()));
        request
    };

    let response = tower::ServiceExt::oneshot(app.clone(), preflight()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_u32(response.headers(), "x-rate-limit-remaining"), Some(1));

    let response = tower::ServiceExt::oneshot(app.clone(), preflight()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(admission.is_blocked(&PEER.parse::<SocketAddr>().unwrap().ip()));

    // Blocked clients are refused on preflight as well as on real requests
    let response = tower::ServiceExt::oneshot(app.clone(), preflight()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let response = make_request(&app, Method::GET, "/health", None, Some(PEER)).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_exempt_address_never_limited() {
    let app = build_router(test_context(RateLimitConfig {
        max_requests: 2,
        exempt: vec!["127.0.0.1".parse::<IpAddr>().unwrap()],
        ..RateLimitConfig::default()
    }));

    for _ in 0..20 {
        let response =
            make_request(&app, Method::GET, "/health", None, Some("127.0.0.1:5000")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.headers.get("x-rate-limit").is_none());
    }
}

#[tokio::test]
async fn test_reset_readmits_blocked_client() {
    let ctx = test_context(limits(2));
    let admission = ctx.admission.clone();
    let app = build_router(ctx);

    make_request(&app, Method::GET, "/health", None, Some(PEER)).await;
    let response = make_request(&app, Method::GET, "/health", None, Some(PEER)).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(admission.reset(), 1);

    let response = make_request(&app, Method::GET, "/health", None, Some(PEER)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(header_u32(&response.headers, "x-rate-limit-remaining"), Some(1));
}

#[tokio::test]
async fn test_unknown_client_address_fails_open() {
    let app = build_router(test_context(limits(1)));

    for _ in 0..3 {
        let response = make_request(&app, Method::GET, "/health", None, None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.headers.get("x-rate-limit").is_none());
    }
}

#[tokio::test]
async fn test_unknown_client_address_fails_closed() {
    let app = build_router(test_context(RateLimitConfig {
        fail_mode: FailMode::Closed,
        ..limits(10)
    }));

    let response = make_request(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_for_counts_original_client() {
    let app = build_router(test_context(RateLimitConfig {
        trust_forwarded_for: true,
        ..limits(3)
    }));

    for _ in 0..3 {
        let request = axum::http::Request::builder()
            .uri("/health")
            .header("x-forwarded-for", "192.0.2.50")
            .body(axum::body::Body::empty())
            .unwrap();
        tower::ServiceExt::oneshot(app.clone(), request).await.unwrap();
    }

    // Proxy address itself still has its full allowance
    let response = make_request(&app, Method::GET, "/health", None, Some("10.0.0.1:80")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(header_u32(&response.headers, "x-rate-limit-remaining"), Some(2));
}

// ============================================================================
// Site
// ============================================================================

#[tokio::test]
async fn test_root_redirects_to_site() {
    let app = build_router(test_context(limits(10)));

    let response = make_request(&app, Method::GET, "/", None, Some(PEER)).await;

    assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers["location"],
        "https://laudiolin.seikimo.moe"
    );
}

#[tokio::test]
async fn test_health_reports_sessions() {
    let ctx = test_context(limits(10));
    let (session, _remote) = connect("desk");
    ctx.registry.insert(session).await;
    let app = build_router(ctx);

    let response = make_request(&app, Method::GET, "/health", None, Some(PEER)).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.body.expect("Expected response body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "laud-gw");
    assert!(body["version"].is_string());
    assert_eq!(body["sessions"], 1);
}

// ============================================================================
// Playback control
// ============================================================================

#[tokio::test]
async fn test_unknown_client_is_404() {
    let app = build_router(test_context(limits(10)));

    let response = make_request(&app, Method::POST, "/elixir/nobody/pause", None, Some(PEER)).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let body = response.body.unwrap();
    assert_eq!(body["error"], "session_not_found");
    assert_eq!(body["details"]["client"], "nobody");
}

#[tokio::test]
async fn test_control_endpoints_forward_commands() {
    let ctx = test_context(limits(100));
    let (session, mut remote) = connect("desk");
    ctx.registry.insert(session).await;
    let app = build_router(ctx);

    let cases = [
        (
            "/elixir/desk/play",
            Some(json!({"data": "playlist-42"})),
            json!({"type": "playTrack", "data": "playlist-42"}),
        ),
        ("/elixir/desk/resume", None, json!({"type": "resume"})),
        ("/elixir/desk/pause", None, json!({"type": "pause"})),
        (
            "/elixir/desk/volume",
            Some(json!({"volume": 70})),
            json!({"type": "volume", "volume": 70}),
        ),
        ("/elixir/desk/shuffle", None, json!({"type": "shuffle"})),
        (
            "/elixir/desk/skip",
            Some(json!({"track": 2})),
            json!({"type": "skip", "track": 2}),
        ),
        (
            "/elixir/desk/seek",
            Some(json!({"position": 95})),
            json!({"type": "seek", "position": 95}),
        ),
    ];

    for (path, body, sent) in cases {
        let response = make_request(&app, Method::POST, path, body, Some(PEER)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", path);
        let body = response.body.unwrap();
        assert_eq!(body["status"], "sent");
        assert_eq!(body["command"], sent["type"]);
        assert_eq!(remote.next_sent().await, sent);
    }
}

#[tokio::test]
async fn test_queue_endpoint_round_trip() {
    let ctx = test_context(limits(10));
    let (session, mut remote) = connect("desk");
    ctx.registry.insert(session).await;
    let app = build_router(ctx);

    let client = tokio::spawn(async move {
        assert_eq!(remote.next_sent().await, json!({"type": "queue"}));
        remote.push(json!({
            "type": "queue",
            "queue": [{"id": "A", "title": "Alpha"}, {"id": "B", "title": "Beta"}]
        }));
        remote
    });

    let response = make_request(&app, Method::GET, "/elixir/desk/queue", None, Some(PEER)).await;
    let _remote = client.await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    let queue = response.body.unwrap()["queue"].clone();
    assert_eq!(queue[0]["id"], "A");
    assert_eq!(queue[1]["title"], "Beta");
    assert_eq!(queue.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_queue_endpoint_times_out() {
    let mut ctx = test_context(limits(10));
    ctx.queue_timeout = Duration::from_millis(50);
    let (session, _remote) = connect("desk");
    ctx.registry.insert(session.clone()).await;
    let app = build_router(ctx);

    let response = make_request(&app, Method::GET, "/elixir/desk/queue", None, Some(PEER)).await;

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.body.unwrap()["error"], "timeout");
    assert!(session.pending_kinds().is_empty());
}

#[tokio::test]
async fn test_closed_session_is_502() {
    let ctx = test_context(limits(10));
    let (session, _remote) = connect("desk");
    ctx.registry.insert(session.clone()).await;
    let app = build_router(ctx);

    session.close().await;

    let response = make_request(&app, Method::POST, "/elixir/desk/pause", None, Some(PEER)).await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.body.unwrap()["error"], "session_closed");
}

#[tokio::test]
async fn test_malformed_queue_response_is_502() {
    let ctx = test_context(limits(10));
    let (session, mut remote) = connect("desk");
    ctx.registry.insert(session).await;
    let app = build_router(ctx);

    let client = tokio::spawn(async move {
        remote.next_sent().await;
        remote.push(json!({"type": "queue"}));
        remote
    });

    let response = make_request(&app, Method::GET, "/elixir/desk/queue", None, Some(PEER)).await;
    let _remote = client.await.unwrap();

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.body.unwrap()["error"], "decode_failed");
}
