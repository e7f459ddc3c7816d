//! Connected gateway sessions
//!
//! One session per client label. A client reconnecting under the same label
//! replaces its previous session, which is closed so its pending waiters are
//! released.

use crate::gateway::session::GatewaySession;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Registry of live sessions
///
/// Uses RwLock: lookups on every control request, writes only on connect
/// and disconnect.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, GatewaySession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under its client label, closing any session it replaces
    pub async fn insert(&self, session: GatewaySession) {
        let previous = self
            .sessions
            .write()
            .await
            .insert(session.client().to_string(), session.clone());

        if let Some(previous) = previous {
            info!(
                client = %session.client(),
                replaced = %previous.id(),
                "Client reconnected, closing previous session"
            );
            previous.close().await;
        }
    }

    /// Remove `session`, unless its label has since been taken by a newer one
    pub async fn remove(&self, session: &GatewaySession) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session.client()) {
            Some(current) if current.id() == session.id() => {
                sessions.remove(session.client());
                true
            }
            _ => false,
        }
    }

    /// Look up the session for a client label
    pub async fn get(&self, client: &str) -> Option<GatewaySession> {
        self.sessions.read().await.get(client).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Close every session (server shutdown)
    pub async fn close_all(&self) {
        let sessions: Vec<GatewaySession> =
            self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
    }
}
