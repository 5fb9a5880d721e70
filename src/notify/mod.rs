//! Fan-out notifier
//!
//! Delivers control events to every connection, to the members of one
//! session, or to a single connection. Each recipient is delivered with its
//! own non-blocking `try_send`, so a full or closed queue only affects that
//! recipient. Chat and gift events are appended to the history ring for their
//! scope before they fan out.

pub mod history;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use history::{ChatEntry, ChatHistory, ChatKind};

use crate::connection::{ConnectionId, ConnectionRegistry, Delivery};
use crate::protocol::ServerEvent;
use crate::session::table::SessionMap;
use crate::session::SessionId;

/// Event fan-out and chat history
#[derive(Clone)]
pub struct Notifier {
    connections: ConnectionRegistry,
    sessions: SessionMap,
    history: Arc<Mutex<ChatHistory>>,
}

impl Notifier {
    pub(crate) fn new(
        connections: ConnectionRegistry,
        sessions: SessionMap,
        history_capacity: usize,
    ) -> Self {
        Self {
            connections,
            sessions,
            history: Arc::new(Mutex::new(ChatHistory::new(history_capacity))),
        }
    }

    /// Deliver to every connected client; returns how many queued it
    pub async fn broadcast_all(&self, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        self.connections
            .senders()
            .await
            .iter()
            .filter(|tx| tx.shared_event(&event).is_queued())
            .count()
    }

    /// Deliver to the producer and consumers of one session
    ///
    /// Returns 0 if the session does not exist.
    pub async fn broadcast_session(&self, session_id: &SessionId, event: ServerEvent) -> usize {
        let entry_arc = self.sessions.read().await.get(session_id).cloned();
        let Some(entry_arc) = entry_arc else {
            return 0;
        };

        let entry = entry_arc.lock().await;
        if entry.is_ended() {
            return 0;
        }
        entry.notify_members(event)
    }

    /// Deliver to a single connection
    pub async fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> Delivery {
        match self.connections.sender(conn).await {
            Some(tx) => tx.event(event),
            None => Delivery::Closed,
        }
    }

    /// Record a chat/gift/system entry and fan it out to its scope
    ///
    /// Entries for a session that no longer exists are discarded.
    pub async fn publish(&self, scope: Option<SessionId>, entry: ChatEntry) -> usize {
        {
            let sessions = self.sessions.read().await;
            if let Some(id) = &scope {
                if !sessions.contains_key(id) {
                    return 0;
                }
            }
            // Map guard held so a concurrent destroy forgets the ring after this push
            self.history.lock().await.push(scope.clone(), entry.clone());
        }

        let event = if entry.is_gift() {
            ServerEvent::GiftEvent {
                session_id: scope.clone(),
                entry,
            }
        } else {
            ServerEvent::ChatEvent {
                session_id: scope.clone(),
                entry,
            }
        };

        match scope {
            Some(id) => self.broadcast_session(&id, event).await,
            None => self.broadcast_all(event).await,
        }
    }

    /// Recent entries for a scope, oldest first
    pub async fn history(&self, scope: Option<&SessionId>) -> Vec<ChatEntry> {
        self.history.lock().await.entries(&scope.cloned())
    }

    /// Send a scope's history to one connection
    pub async fn replay(&self, conn: ConnectionId, scope: Option<SessionId>) -> Delivery {
        let entries = self.history(scope.as_ref()).await;
        self.send_to(
            conn,
            ServerEvent::ChatHistoryReplay {
                session_id: scope,
                entries,
            },
        )
        .await
    }

    pub(crate) async fn forget_session(&self, id: &SessionId) {
        self.history.lock().await.remove_session(id);
    }
}
