//! Shared test harness: in-memory gateway pipes and router requests

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::ConnectInfo;
use futures::channel::mpsc;
use futures::StreamExt;
use http::{HeaderMap, Method, Request, StatusCode};
use laud_common::config::RateLimitConfig;
use laud_gw::admission::AdmissionController;
use laud_gw::api::AppContext;
use laud_gw::gateway::{GatewaySession, SessionRegistry};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// The playback client's end of an in-memory gateway channel
pub struct Remote {
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub inbound: mpsc::UnboundedSender<Result<String, std::io::Error>>,
}

impl Remote {
    /// Deliver a frame to the session
    pub fn push(&self, frame: Value) {
        self.inbound
            .unbounded_send(Ok(frame.to_string()))
            .expect("session receive loop gone");
    }

    /// Next frame the session wrote, decoded
    pub async fn next_sent(&mut self) -> Value {
        let text = self.outbound.next().await.expect("session sent nothing");
        serde_json::from_str(&text).expect("session sent invalid JSON")
    }

    /// Simulate the client dropping the connection
    pub fn disconnect(self) {
        drop(self);
    }
}

/// Open a session over an in-memory pipe
pub fn connect(client: &str) -> (GatewaySession, Remote) {
    let (out_tx, out_rx) = mpsc::unbounded();
    let (in_tx, in_rx) = mpsc::unbounded();
    let session = GatewaySession::spawn(client, out_tx, in_rx);
    (
        session,
        Remote {
            outbound: out_rx,
            inbound: in_tx,
        },
    )
}

/// Rate limits with no exempt addresses
pub fn limits(max_requests: u32) -> RateLimitConfig {
    RateLimitConfig {
        max_requests,
        exempt: Vec::new(),
        ..RateLimitConfig::default()
    }
}

pub fn test_context(limits: RateLimitConfig) -> AppContext {
    AppContext {
        registry: Arc::new(SessionRegistry::new()),
        admission: Arc::new(AdmissionController::new(&limits)),
        site_url: "https://laudiolin.seikimo.moe".to_string(),
        queue_timeout: Duration::from_secs(2),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

/// Send one request through the router as if it came from `peer`
pub async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
    peer: Option<&str>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(path);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }

    let mut request = match body {
        Some(json_body) => builder.body(Body::from(json_body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    if let Some(peer) = peer {
        let addr: SocketAddr = peer.parse().expect("invalid peer address");
        request.extensions_mut().insert(ConnectInfo(addr));
    }

    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Read a numeric header
pub fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
