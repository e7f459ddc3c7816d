//! Gateway session: command/response over a push-style message channel
//!
//! A [`GatewaySession`] owns one open, ordered channel to a playback client.
//! Outbound commands are written with [`GatewaySession::send`]; responses are
//! picked up by registering a one-shot [`Waiter`] for a frame kind.
//!
//! # Correlation
//!
//! Responses carry no request identifier. A waiter is matched purely by the
//! frame's `type`, so at most one request per kind can be outstanding on a
//! session. Registering a second waiter for a kind replaces the first; the
//! replaced waiter is not resolved by later frames and only completes (with
//! [`GatewayError::SessionClosed`]) when the session shuts down.
//!
//! # Lifecycle
//!
//! `Open -> Closed`. The session closes when the inbound stream ends or
//! errors, or when [`GatewaySession::close`] is called. Every pending waiter
//! then resolves with `SessionClosed`, and all further operations fail
//! immediately with the same error.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::frame::Frame;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outbound half of the channel, erased to a single error type
type FrameSink = Pin<Box<dyn Sink<String, Error = GatewayError> + Send>>;

type WaiterSender = oneshot::Sender<GatewayResult<Frame>>;

/// Buffer for non-consuming frame subscribers
const EVENT_BUFFER: usize = 64;

struct Registration {
    token: u64,
    tx: WaiterSender,
}

#[derive(Default)]
struct Waiters {
    closed: bool,
    pending: HashMap<String, Registration>,
    /// Replaced registrations, held unresolved until the session closes
    displaced: Vec<WaiterSender>,
}

struct Shared {
    id: Uuid,
    client: String,
    writer: tokio::sync::Mutex<FrameSink>,
    waiters: Mutex<Waiters>,
    next_token: AtomicU64,
    events: broadcast::Sender<Frame>,
    closed_tx: watch::Sender<bool>,
}

impl Shared {
    fn lock_waiters(&self) -> MutexGuard<'_, Waiters> {
        // Waiter map updates never panic mid-way, so a poisoned lock still
        // holds a consistent map.
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    fn dispatch(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session = %self.id, client = %self.client, "Dropping malformed frame: {}", e);
                return;
            }
        };

        if self.events.receiver_count() > 0 {
            let _ = self.events.send(frame.clone());
        }

        let registration = self.lock_waiters().pending.remove(frame.kind());
        match registration {
            Some(registration) => {
                // Receiver may already be gone if the caller gave up
                let _ = registration.tx.send(Ok(frame));
            }
            None => {
                debug!(session = %self.id, kind = frame.kind(), "No waiter registered, dropping frame");
            }
        }
    }

    fn deregister(&self, kind: &str, token: u64) {
        let mut waiters = self.lock_waiters();
        if waiters.pending.get(kind).map(|r| r.token) == Some(token) {
            waiters.pending.remove(kind);
        }
    }

    fn shutdown(&self, reason: &str) {
        let (pending, displaced) = {
            let mut waiters = self.lock_waiters();
            if waiters.closed {
                return;
            }
            waiters.closed = true;
            (
                std::mem::take(&mut waiters.pending),
                std::mem::take(&mut waiters.displaced),
            )
        };

        let released = pending.len() + displaced.len();
        for registration in pending.into_values() {
            let _ = registration.tx.send(Err(GatewayError::SessionClosed));
        }
        for tx in displaced {
            let _ = tx.send(Err(GatewayError::SessionClosed));
        }

        self.closed_tx.send_replace(true);
        info!(
            session = %self.id,
            client = %self.client,
            released_waiters = released,
            "Gateway session closed: {}",
            reason
        );
    }
}

/// Handle to one gateway session
///
/// Cheap to clone; every clone refers to the same session.
#[derive(Clone)]
pub struct GatewaySession {
    shared: Arc<Shared>,
}

impl GatewaySession {
    /// Start a session over an already open channel
    ///
    /// `sink` receives encoded outbound frames; `stream` yields inbound text
    /// messages in channel order. The receive loop runs on its own task until
    /// the stream ends, errors, or the session is closed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<Si, St, E>(client: impl Into<String>, sink: Si, stream: St) -> Self
    where
        Si: Sink<String> + Send + 'static,
        Si::Error: fmt::Display,
        St: Stream<Item = Result<String, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let sink: FrameSink =
            Box::pin(sink.sink_map_err(|e| GatewayError::ChannelClosed(e.to_string())));
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (closed_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            client: client.into(),
            writer: tokio::sync::Mutex::new(sink),
            waiters: Mutex::new(Waiters::default()),
            next_token: AtomicU64::new(0),
            events,
            closed_tx,
        });

        info!(session = %shared.id, client = %shared.client, "Gateway session opened");
        tokio::spawn(receive_loop(Arc::clone(&shared), stream));

        Self { shared }
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Label of the connected client
    pub fn client(&self) -> &str {
        &self.shared.client
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Encode `frame` as JSON and write it to the channel
    ///
    /// Concurrent senders are serialised; no acknowledgement is awaited.
    pub async fn send<T>(&self, frame: &T) -> GatewayResult<()>
    where
        T: Serialize + ?Sized,
    {
        if self.is_closed() {
            return Err(GatewayError::SessionClosed);
        }

        let text = serde_json::to_string(frame).map_err(|e| GatewayError::Encode(e.to_string()))?;

        let mut writer = self.shared.writer.lock().await;
        writer.send(text).await
    }

    /// Register a one-shot waiter for the next frame of `kind`
    ///
    /// Register before sending the request so a fast response cannot slip
    /// past. Replaces any waiter already registered for `kind`.
    pub fn register(&self, kind: impl Into<String>) -> GatewayResult<Waiter> {
        let kind = kind.into();
        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut waiters = self.shared.lock_waiters();
            if waiters.closed {
                return Err(GatewayError::SessionClosed);
            }

            if let Some(previous) = waiters.pending.insert(kind.clone(), Registration { token, tx }) {
                warn!(
                    session = %self.shared.id,
                    kind = %kind,
                    "Replacing outstanding waiter; the earlier caller will not see a response"
                );
                waiters.displaced.retain(|tx| !tx.is_closed());
                waiters.displaced.push(previous.tx);
            }
        }

        Ok(Waiter {
            session: Arc::downgrade(&self.shared),
            kind,
            token,
            rx,
            settled: false,
        })
    }

    /// Wait for the next frame of `kind` with no upper bound
    pub async fn await_once(&self, kind: impl Into<String>) -> GatewayResult<Frame> {
        self.register(kind)?.recv().await
    }

    /// Subscribe to every well-formed inbound frame without consuming it
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.shared.events.subscribe()
    }

    /// Kinds that currently have a registered waiter
    pub fn pending_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.shared.lock_waiters().pending.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Resolves once the session has closed
    pub async fn closed(&self) {
        let mut rx = self.shared.closed_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Close the session from the server side
    ///
    /// Releases every pending waiter, stops the receive loop and closes the
    /// outbound half of the channel.
    pub async fn close(&self) {
        self.shared.shutdown("closed by server");

        let mut writer = self.shared.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!(session = %self.shared.id, "Error closing channel: {}", e);
        }
    }
}

impl fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySession")
            .field("id", &self.shared.id)
            .field("client", &self.shared.client)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn receive_loop<St, E>(shared: Arc<Shared>, stream: St)
where
    St: Stream<Item = Result<String, E>> + Send,
    E: fmt::Display + Send,
{
    let mut stream = Box::pin(stream);
    let mut closed_rx = shared.closed_tx.subscribe();

    let reason = loop {
        if *closed_rx.borrow_and_update() {
            break "closed by server".to_string();
        }

        let next = tokio::select! {
            next = stream.next() => next,
            _ = closed_rx.changed() => continue,
        };

        match next {
            Some(Ok(text)) => shared.dispatch(&text),
            Some(Err(e)) => break format!("read error: {}", e),
            None => break "channel closed by client".to_string(),
        }
    };

    shared.shutdown(&reason);
}

/// A registered one-shot wait for a frame kind
///
/// Dropping a waiter that has not resolved removes its registration, so an
/// abandoned wait never swallows a later frame meant for someone else.
pub struct Waiter {
    session: Weak<Shared>,
    kind: String,
    token: u64,
    rx: oneshot::Receiver<GatewayResult<Frame>>,
    settled: bool,
}

impl Waiter {
    /// Frame kind this waiter is registered for
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Wait until the frame arrives or the session closes
    pub async fn recv(mut self) -> GatewayResult<Frame> {
        let result = (&mut self.rx).await;
        self.settled = true;
        result.unwrap_or(Err(GatewayError::SessionClosed))
    }

    /// Wait at most `limit`, deregistering on expiry
    pub async fn recv_timeout(mut self, limit: Duration) -> GatewayResult<Frame> {
        match tokio::time::timeout(limit, &mut self.rx).await {
            Ok(result) => {
                self.settled = true;
                result.unwrap_or(Err(GatewayError::SessionClosed))
            }
            Err(_) => {
                self.deregister();
                self.settled = true;
                // A frame may have been dispatched between expiry and deregistration
                match self.rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Timeout {
                        kind: self.kind.clone(),
                    }),
                }
            }
        }
    }

    /// Give up on the wait and release the registration
    pub fn cancel(self) {}

    fn deregister(&self) {
        if let Some(shared) = self.session.upgrade() {
            shared.deregister(&self.kind, self.token);
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if !self.settled {
            self.deregister();
        }
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("kind", &self.kind)
            .field("token", &self.token)
            .finish()
    }
}
