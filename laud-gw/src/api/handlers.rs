//! HTTP request handlers
//!
//! Control endpoints look up the client's gateway session and forward one
//! playback command. Only the queue endpoint waits for an answer.

use crate::api::error::ApiError;
use crate::api::AppContext;
use crate::gateway::{commands, GatewaySession};
use axum::{
    extract::{Path, State},
    response::Redirect,
    Json,
};
use laud_common::api::HealthResponse;
use laud_common::TrackData;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    /// Track or playlist ID, or a URL
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub volume: u32,
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    /// Queue position to jump to
    pub track: u32,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    /// Wire type of the command that was forwarded
    pub command: String,
}

impl CommandResponse {
    fn sent(command: &str) -> Json<Self> {
        Json(Self {
            status: "sent".to_string(),
            command: command.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueResponse {
    pub queue: Vec<TrackData>,
}

// ============================================================================
// Site Endpoints
// ============================================================================

/// GET / - Send visitors to the main site
pub async fn redirect(State(ctx): State<AppContext>) -> Redirect {
    Redirect::temporary(&ctx.site_url)
}

/// GET /health - Health check
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "laud-gw".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: ctx.registry.len().await,
    })
}

// ============================================================================
// Playback Control Endpoints
// ============================================================================

async fn session_for(ctx: &AppContext, client: &str) -> Result<GatewaySession, ApiError> {
    ctx.registry
        .get(client)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(client.to_string()))
}

/// POST /elixir/:client/play
pub async fn play(
    State(ctx): State<AppContext>,
    Path(client): Path<String>,
    Json(req): Json<PlayRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    info!(client = %client, data = %req.data, "Play request");
    let session = session_for(&ctx, &client).await?;
    commands::play_track(&session, req.data).await?;
    Ok(CommandResponse::sent("playTrack"))
}

/// POST /elixir/:client/resume
pub async fn resume(
    State(ctx): State<AppContext>,
    Path(client): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let session = session_for(&ctx, &client).await?;
    commands::resume(&session).await?;
    Ok(CommandResponse::sent("resume"))
}

/// POST /elixir/:client/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Path(client): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let session = session_for(&ctx, &client).await?;
    commands::pause(&session).await?;
    Ok(CommandResponse::sent("pause"))
}

/// POST /elixir/:client/volume
pub async fn volume(
    State(ctx): State<AppContext>,
    Path(client): Path<String>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    debug!(client = %client, volume = req.volume, "Volume request");
    let session = session_for(&ctx, &client).await?;
    commands::volume(&session, req.volume).await?;
    Ok(CommandResponse::sent("volume"))
}

/// POST /elixir/:client/shuffle
pub async fn shuffle(
    State(ctx): State<AppContext>,
    Path(client): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let session = session_for(&ctx, &client).await?;
    commands::shuffle(&session).await?;
    Ok(CommandResponse::sent("shuffle"))
}

/// POST /elixir/:client/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Path(client): Path<String>,
    Json(req): Json<SkipRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let session = session_for(&ctx, &client).await?;
    commands::skip(&session, req.track).await?;
    Ok(CommandResponse::sent("skip"))
}

/// POST /elixir/:client/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Path(client): Path<String>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let session = session_for(&ctx, &client).await?;
    commands::seek(&session, req.position).await?;
    Ok(CommandResponse::sent("seek"))
}

/// GET /elixir/:client/queue - Ask the client for its queue
///
/// Bounded by the configured queue timeout; a client that never answers
/// yields 504.
pub async fn queue(
    State(ctx): State<AppContext>,
    Path(client): Path<String>,
) -> Result<Json<QueueResponse>, ApiError> {
    let session = session_for(&ctx, &client).await?;
    let queue = commands::queue_within(&session, ctx.queue_timeout).await?;
    debug!(client = %client, tracks = queue.len(), "Queue received");
    Ok(Json(QueueResponse { queue }))
}
