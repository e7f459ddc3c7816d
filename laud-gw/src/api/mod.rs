//! HTTP surface: router, shared context and handlers
//!
//! Every request, CORS preflights included, passes the admission layer first.

pub mod error;
pub mod handlers;
pub mod ws;

pub use error::ApiError;

use crate::admission::{AdmissionController, AdmissionLayer};
use crate::gateway::SessionRegistry;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<SessionRegistry>,
    pub admission: Arc<AdmissionController>,
    /// Redirect target for `GET /`
    pub site_url: String,
    /// Upper bound on a queue round trip
    pub queue_timeout: Duration,
}

/// Build the router with all routes and layers
pub fn build_router(ctx: AppContext) -> Router {
    let admission = AdmissionLayer::new(Arc::clone(&ctx.admission));

    Router::new()
        .route("/", get(handlers::redirect))
        .route("/health", get(handlers::health))
        // Gateway connections
        .route("/gateway", get(ws::gateway))
        // Playback control
        .route("/elixir/:client/play", post(handlers::play))
        .route("/elixir/:client/resume", post(handlers::resume))
        .route("/elixir/:client/pause", post(handlers::pause))
        .route("/elixir/:client/volume", post(handlers::volume))
        .route("/elixir/:client/shuffle", post(handlers::shuffle))
        .route("/elixir/:client/skip", post(handlers::skip))
        .route("/elixir/:client/seek", post(handlers::seek))
        .route("/elixir/:client/queue", get(handlers::queue))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
        // Outside CORS so preflights are counted too
        .layer(admission)
        .layer(TraceLayer::new_for_http())
}
