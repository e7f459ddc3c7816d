//! Tower layer applying the admission check to every HTTP request
//!
//! Runs before routing, so a refused request never reaches a handler.
//! Non-exempt decisions carry `X-Rate-Limit` and `X-Rate-Limit-Remaining`.

use crate::admission::controller::{AdmissionController, Decision};
use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use laud_common::api::ErrorResponse;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

/// Configured request limit
pub const X_RATE_LIMIT: HeaderName = HeaderName::from_static("x-rate-limit");
/// Requests left before the client is blocked
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");

/// Tower layer wrapping services with the admission check
#[derive(Clone)]
pub struct AdmissionLayer {
    controller: Arc<AdmissionController>,
}

impl AdmissionLayer {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self { controller }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            controller: Arc::clone(&self.controller),
        }
    }
}

/// Tower service that admits or refuses each request
#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    controller: Arc<AdmissionController>,
}

impl<S> Service<Request> for AdmissionService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let decision = match client_addr(&request, self.controller.trust_forwarded_for()) {
            Some(addr) => self.controller.check(addr),
            None => {
                warn!(
                    path = %request.uri().path(),
                    "Cannot determine client address, applying fail mode {:?}",
                    self.controller.fail_mode()
                );
                self.controller.unavailable()
            }
        };

        if let Decision::Reject {
            limit, remaining, ..
        } = decision
        {
            return Box::pin(async move { Ok(rate_limited_response(limit, remaining)) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(request).await?;
            if let Some((limit, remaining)) = decision.headers() {
                insert_limit_headers(response.headers_mut(), limit, remaining);
            }
            Ok(response)
        })
    }
}

/// Resolve the client address for a request
///
/// With `trust_forwarded_for`, the first `X-Forwarded-For` entry wins;
/// otherwise (or if that header is absent or unparsable) the TCP peer from
/// `ConnectInfo` is used.
pub fn client_addr(request: &Request, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn insert_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert(X_RATE_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
}

/// 429 response with the rate limit headers and a JSON error body
pub fn rate_limited_response(limit: u32, remaining: u32) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse::new(
            "rate_limited",
            "Too many requests, try again later",
        )),
    )
        .into_response();
    insert_limit_headers(response.headers_mut(), limit, remaining);
    response
}
