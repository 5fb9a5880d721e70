//! Session table implementation
//!
//! The central table that tracks all live sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use super::entry::{SessionEntry, SessionMetadata, SessionSnapshot, SessionSummary};
use super::id::{SessionId, SessionIdGenerator};
use crate::connection::{ConnectionId, ConnectionRegistry, Role};
use crate::error::RelayError;
use crate::notify::Notifier;
use crate::presence;
use crate::protocol::{EndReason, ServerEvent};

/// Shared map of session id to entry
pub(crate) type SessionMap = Arc<RwLock<HashMap<SessionId, Arc<Mutex<SessionEntry>>>>>;

/// Table of all live sessions
///
/// Cheap to clone. The outer `RwLock` only guards insert/remove/lookup; all
/// per-session mutation goes through the entry's own mutex.
#[derive(Clone)]
pub struct SessionTable {
    sessions: SessionMap,
    ids: Arc<SessionIdGenerator>,
    connections: ConnectionRegistry,
    notifier: Notifier,
}

impl SessionTable {
    /// Create an empty table bound to a connection registry
    pub fn new(connections: ConnectionRegistry, history_capacity: usize) -> Self {
        let sessions = SessionMap::default();
        let notifier = Notifier::new(connections.clone(), sessions.clone(), history_capacity);

        Self {
            sessions,
            ids: Arc::new(SessionIdGenerator::new()),
            connections,
            notifier,
        }
    }

    /// Fan-out notifier sharing this table's session map
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Create a session produced by `producer`
    ///
    /// Fails with `AlreadyProducing` if the connection already produces a
    /// session. Binds the connection's role to producer and announces the new
    /// session list to every connection.
    pub async fn create_session(
        &self,
        producer: ConnectionId,
        metadata: SessionMetadata,
    ) -> Result<SessionId, RelayError> {
        let conn = self
            .connections
            .get(producer)
            .await
            .ok_or(RelayError::ConnectionNotFound(producer))?;

        if conn.role == Role::Producer {
            return Err(RelayError::AlreadyProducing(producer));
        }

        let (seq, id) = self.ids.next();

        // Re-checked atomically under the registry lock
        self.connections.bind_producer(producer, id.clone()).await?;

        let entry = SessionEntry::new(
            id.clone(),
            seq,
            metadata,
            producer,
            conn.sender().clone(),
        );

        tracing::info!(
            session = %id,
            producer = %producer,
            title = %entry.metadata.title,
            codec = %entry.metadata.codec,
            "Session created"
        );

        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(entry)));

        self.announce().await;
        Ok(id)
    }

    /// Destroy a session
    ///
    /// Idempotent: returns false if the session does not exist. Releases every
    /// bound consumer, tells members the session ended, drops its chat history
    /// and announces the new session list.
    pub async fn destroy_session(&self, id: &SessionId, reason: EndReason) -> bool {
        let removed = self.sessions.write().await.remove(id);
        let Some(entry_arc) = removed else {
            return false;
        };

        let (producer, producer_tx, released) = {
            let mut entry = entry_arc.lock().await;
            let released = entry.end();
            (entry.producer, entry.producer_tx.clone(), released)
        };

        self.connections.unbind(producer, id).await;
        presence::release_listeners(&self.connections, id, &released).await;

        let ended = Arc::new(ServerEvent::SessionEnded {
            session_id: id.clone(),
            reason,
        });
        for (_, listener) in &released {
            let _ = listener.sender.shared_event(&ended);
        }
        let _ = producer_tx.shared_event(&ended);

        self.notifier.forget_session(id).await;

        tracing::info!(
            session = %id,
            producer = %producer,
            released = released.len(),
            reason = ?reason,
            "Session destroyed"
        );

        self.announce().await;
        true
    }

    /// Look up a session
    pub async fn get_session(&self, id: &SessionId) -> Result<SessionSnapshot, RelayError> {
        let entry_arc = self
            .entry(id)
            .await
            .ok_or_else(|| RelayError::SessionNotFound(id.clone()))?;

        let entry = entry_arc.lock().await;
        if entry.is_ended() {
            return Err(RelayError::SessionNotFound(id.clone()));
        }
        Ok(entry.snapshot())
    }

    /// Summaries of all live sessions, oldest first
    pub async fn list_live_sessions(&self) -> Vec<SessionSummary> {
        let entries: Vec<Arc<Mutex<SessionEntry>>> =
            self.sessions.read().await.values().cloned().collect();

        let mut live = Vec::with_capacity(entries.len());
        for entry_arc in entries {
            let entry = entry_arc.lock().await;
            if !entry.is_ended() {
                live.push((entry.seq, entry.summary()));
            }
        }

        live.sort_by_key(|(seq, _)| *seq);
        live.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Producer connection of a session
    pub async fn producer_of(&self, id: &SessionId) -> Option<ConnectionId> {
        let entry_arc = self.entry(id).await?;
        let entry = entry_arc.lock().await;
        (!entry.is_ended()).then_some(entry.producer)
    }

    /// Check if a live session exists
    pub async fn contains(&self, id: &SessionId) -> bool {
        self.producer_of(id).await.is_some()
    }

    /// Number of sessions in the table
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Total sessions ever created
    pub fn total_created(&self) -> u64 {
        self.ids.issued()
    }

    /// Broadcast the current session list to every connection
    pub async fn announce(&self) -> usize {
        let sessions = self.list_live_sessions().await;
        self.notifier
            .broadcast_all(ServerEvent::SessionListUpdated { sessions })
            .await
    }

    /// Remove abandoned sessions
    ///
    /// A session is abandoned when it has no listeners and its producer has
    /// been silent for `idle_timeout`, or when its producer connection is no
    /// longer registered.
    pub async fn sweep(&self, idle_timeout: Duration) -> Vec<SessionId> {
        let entries: Vec<(SessionId, Arc<Mutex<SessionEntry>>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        let mut abandoned = Vec::new();
        for (id, entry_arc) in entries {
            // Skip sessions busy with a join or fan-out; next sweep gets them
            let Ok(entry) = entry_arc.try_lock() else {
                continue;
            };

            let idle = entry.listener_count() == 0
                && entry.last_activity.elapsed() >= idle_timeout;
            let orphaned = !self.connections.contains(entry.producer).await;

            if idle || orphaned {
                abandoned.push(id);
            }
        }

        for id in &abandoned {
            self.destroy_session(id, EndReason::Idle).await;
            tracing::info!(session = %id, "Session removed by sweep");
        }

        abandoned
    }

    pub(crate) async fn entry(&self, id: &SessionId) -> Option<Arc<Mutex<SessionEntry>>> {
        self.sessions.read().await.get(id).cloned()
    }
}
