//! WebSocket transport for gateway sessions
//!
//! Adapts an axum WebSocket into the text sink/stream pair a
//! [`GatewaySession`] runs over. Binary messages are accepted when they hold
//! UTF-8; ping/pong/close are handled by the socket and never reach the
//! session.

use crate::api::AppContext;
use crate::gateway::GatewaySession;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{future, SinkExt, StreamExt, TryStreamExt};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    /// Label the session is registered under; random if absent
    pub client: Option<String>,
}

/// GET /gateway - Upgrade to a gateway session
pub async fn gateway(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Query(params): Query<GatewayParams>,
) -> Response {
    let client = params
        .client
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    debug!(client = %client, "Gateway upgrade requested");
    ws.on_upgrade(move |socket| run_session(ctx, client, socket))
}

async fn run_session(ctx: AppContext, client: String, socket: WebSocket) {
    let (sink, stream) = socket.split();

    let sink = sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));
    let stream = stream.try_filter_map(|message| {
        future::ready(Ok::<_, axum::Error>(match message {
            Message::Text(text) => Some(text),
            Message::Binary(bytes) => String::from_utf8(bytes).ok(),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
        }))
    });

    let session = GatewaySession::spawn(client, sink, stream);
    ctx.registry.insert(session.clone()).await;

    session.closed().await;

    if ctx.registry.remove(&session).await {
        info!(client = %session.client(), session = %session.id(), "Gateway client disconnected");
    }
}
