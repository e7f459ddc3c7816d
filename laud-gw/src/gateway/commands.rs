//! Playback command vocabulary
//!
//! Stateless helpers that drive a remote playback client through a
//! [`GatewaySession`]. Everything except [`queue`] is fire-and-forget.
//!
//! [`queue`] is the only round trip. It registers a waiter for `queue`
//! frames before sending the request, so it shares the session-wide rule
//! that only one queue request may be in flight at a time.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::frame::Frame;
use crate::gateway::session::GatewaySession;
use laud_common::TrackData;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Frame kind carrying a queue response
pub const QUEUE_KIND: &str = "queue";

/// Outbound commands understood by playback clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Play a track or playlist by ID or URL
    PlayTrack { data: String },
    Resume,
    Pause,
    /// Set player volume
    Volume { volume: u32 },
    /// Shuffle the client's queue
    Shuffle,
    /// Jump to a queue position
    Skip { track: u32 },
    /// Seek within the current track
    Seek { position: u64 },
    /// Request the client's queue
    Queue,
}

impl Command {
    /// Wire `type` tag for this command
    pub fn kind(&self) -> &'static str {
        match self {
            Command::PlayTrack { .. } => "playTrack",
            Command::Resume => "resume",
            Command::Pause => "pause",
            Command::Volume { .. } => "volume",
            Command::Shuffle => "shuffle",
            Command::Skip { .. } => "skip",
            Command::Seek { .. } => "seek",
            Command::Queue => QUEUE_KIND,
        }
    }
}

/// Play a track or playlist on the client
pub async fn play_track(session: &GatewaySession, data: impl Into<String>) -> GatewayResult<()> {
    session
        .send(&Command::PlayTrack { data: data.into() })
        .await
}

/// Resume the client's player
pub async fn resume(session: &GatewaySession) -> GatewayResult<()> {
    session.send(&Command::Resume).await
}

/// Pause the client's player
pub async fn pause(session: &GatewaySession) -> GatewayResult<()> {
    session.send(&Command::Pause).await
}

pub async fn volume(session: &GatewaySession, level: u32) -> GatewayResult<()> {
    session.send(&Command::Volume { volume: level }).await
}

pub async fn shuffle(session: &GatewaySession) -> GatewayResult<()> {
    session.send(&Command::Shuffle).await
}

/// Skip to the given position in the client's queue
pub async fn skip(session: &GatewaySession, track: u32) -> GatewayResult<()> {
    session.send(&Command::Skip { track }).await
}

/// Seek to `position` within the current track
pub async fn seek(session: &GatewaySession, position: u64) -> GatewayResult<()> {
    session.send(&Command::Seek { position }).await
}

/// Fetch the client's queue, waiting until it answers or the session closes
pub async fn queue(session: &GatewaySession) -> GatewayResult<Vec<TrackData>> {
    let waiter = session.register(QUEUE_KIND)?;
    session.send(&Command::Queue).await?;

    decode_queue(waiter.recv().await?)
}

/// Fetch the client's queue, giving up after `limit`
pub async fn queue_within(
    session: &GatewaySession,
    limit: Duration,
) -> GatewayResult<Vec<TrackData>> {
    let waiter = session.register(QUEUE_KIND)?;
    session.send(&Command::Queue).await?;

    decode_queue(waiter.recv_timeout(limit).await?)
}

fn decode_queue(frame: Frame) -> GatewayResult<Vec<TrackData>> {
    let decode_error = |reason: String| GatewayError::Decode {
        kind: QUEUE_KIND.to_string(),
        reason,
    };

    let mut body = frame.into_body();
    let entries = match body.get_mut("queue").map(Value::take) {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(decode_error("'queue' is not an array".to_string())),
        None => return Err(decode_error("missing 'queue' field".to_string())),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry)
                .map_err(|e| decode_error(format!("entry {}: {}", index, e)))
        })
        .collect()
}
