//! Relay hub
//!
//! Owns every relay component and turns inbound client events into calls on
//! them. Failures are reported only to the connection whose event caused
//! them, as an `error` event; chunk submission failures are logged and
//! otherwise ignored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::connection::{ConnectionId, ConnectionRegistry, Outbound, Role};
use crate::error::{ErrorKind, RelayError};
use crate::notify::{ChatEntry, Notifier};
use crate::presence::Presence;
use crate::protocol::{ClientEvent, EndReason, ServerEvent};
use crate::relay::ChunkRelay;
use crate::session::{RelayConfig, SessionId, SessionMetadata, SessionTable};
use crate::signaling::SignalingRelay;
use crate::stats::ServerStats;

/// Entry point to the relay engine
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RelayHub {
    config: Arc<RelayConfig>,
    started_at: Instant,
    connections: ConnectionRegistry,
    sessions: SessionTable,
    chunk_relay: ChunkRelay,
    presence: Presence,
    signaling: SignalingRelay,
}

impl RelayHub {
    /// Create a hub with default configuration
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a hub with custom configuration
    pub fn with_config(config: RelayConfig) -> Self {
        let connections = ConnectionRegistry::new();
        let sessions = SessionTable::new(connections.clone(), config.history_capacity);

        Self {
            chunk_relay: ChunkRelay::new(sessions.clone()),
            presence: Presence::new(sessions.clone(), connections.clone(), config.max_listeners),
            signaling: SignalingRelay::new(connections.clone()),
            config: Arc::new(config),
            started_at: Instant::now(),
            connections,
            sessions,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn chunk_relay(&self) -> &ChunkRelay {
        &self.chunk_relay
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn signaling(&self) -> &SignalingRelay {
        &self.signaling
    }

    pub fn notifier(&self) -> &Notifier {
        self.sessions.notifier()
    }

    /// Register a new client connection
    ///
    /// The client is greeted with its id, the current session list and the
    /// global chat history. The returned receiver must be drained by the
    /// connection's writer.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (conn, rx) = self.connections.register(self.config.outbound_capacity).await;
        let notifier = self.notifier();

        notifier
            .send_to(conn, ServerEvent::Welcome { connection_id: conn })
            .await;
        let sessions = self.sessions.list_live_sessions().await;
        notifier
            .send_to(conn, ServerEvent::SessionListUpdated { sessions })
            .await;
        notifier.replay(conn, None).await;

        tracing::debug!(conn = %conn, "Client connected");
        (conn, rx)
    }

    /// Handle a client disconnect; safe to call more than once
    ///
    /// The connection's writer is asked to close once it has flushed what is
    /// already queued.
    pub async fn disconnect(&self, conn: ConnectionId) {
        if let Some(state) = self.presence.on_disconnect(conn).await {
            state.sender().deliver(Outbound::Close);
            tracing::debug!(
                conn = %conn,
                role = ?state.role,
                connected_secs = state.duration().as_secs(),
                "Client disconnected"
            );
        }
    }

    /// Handle a JSON text frame
    pub async fn handle_text(&self, conn: ConnectionId, text: &str) {
        match ClientEvent::from_json(text) {
            Ok(event) => self.handle_event(conn, event).await,
            Err(e) => {
                tracing::debug!(conn = %conn, error = %e, "Malformed client message");
                self.notifier()
                    .send_to(
                        conn,
                        ServerEvent::Error {
                            kind: ErrorKind::InvalidMessage,
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
        }
    }

    /// Handle a decoded client event
    pub async fn handle_event(&self, conn: ConnectionId, event: ClientEvent) {
        if let Err(err) = self.dispatch(conn, event).await {
            match err.kind() {
                ErrorKind::Unauthorized => {
                    tracing::warn!(conn = %conn, error = %err, "Unauthorized request")
                }
                _ => tracing::debug!(conn = %conn, error = %err, "Request failed"),
            }
            self.notifier()
                .send_to(conn, ServerEvent::from(&err))
                .await;
        }
    }

    async fn dispatch(&self, conn: ConnectionId, event: ClientEvent) -> Result<(), RelayError> {
        match event {
            ClientEvent::ProducerReady {
                title,
                codec,
                display_name,
            } => {
                self.leave_current(conn).await;

                let session_id = self
                    .sessions
                    .create_session(
                        conn,
                        SessionMetadata::new(title, codec, display_name.clone()),
                    )
                    .await?;
                self.connections.set_display_name(conn, &display_name).await;
                self.notifier()
                    .send_to(conn, ServerEvent::SessionCreated { session_id })
                    .await;
            }

            ClientEvent::ProducerStop { session_id } => {
                match self.sessions.producer_of(&session_id).await {
                    None => return Err(RelayError::SessionNotFound(session_id)),
                    Some(producer) if producer != conn => {
                        return Err(RelayError::Unauthorized {
                            conn,
                            action: "stop a session it does not produce",
                        });
                    }
                    Some(_) => {
                        self.sessions
                            .destroy_session(&session_id, EndReason::ProducerStopped)
                            .await;
                    }
                }
            }

            ClientEvent::ConsumerJoin {
                session_id,
                display_name,
            } => {
                self.presence.join(&session_id, conn, &display_name).await?;
                self.connections.set_display_name(conn, &display_name).await;
            }

            ClientEvent::ConsumerLeave { session_id } => {
                self.presence.leave(&session_id, conn).await;
            }

            ClientEvent::Signal { to, payload } => {
                self.signaling.relay(conn, to, payload).await;
            }

            ClientEvent::ChatSend { session_id, text } => {
                let author = self.author(conn).await;
                self.publish(session_id, ChatEntry::chat(author, text)).await?;
            }

            ClientEvent::GiftSend {
                session_id,
                gift_id,
            } => {
                let author = self.author(conn).await;
                self.publish(session_id, ChatEntry::gift(author, gift_id)).await?;
            }

            ClientEvent::ListSessionsRequest => {
                let sessions = self.sessions.list_live_sessions().await;
                self.notifier()
                    .send_to(conn, ServerEvent::SessionListUpdated { sessions })
                    .await;
            }

            ClientEvent::ChatHistoryRequest { session_id } => {
                if let Some(id) = &session_id {
                    if !self.sessions.contains(id).await {
                        return Err(RelayError::SessionNotFound(id.clone()));
                    }
                }
                self.notifier().replay(conn, session_id).await;
            }
        }

        Ok(())
    }

    /// Handle a binary frame: a chunk for the session this connection produces
    pub async fn handle_chunk(&self, conn: ConnectionId, chunk: Bytes) {
        let Some(state) = self.connections.get(conn).await else {
            return;
        };

        match (state.role, state.session) {
            (Role::Producer, Some(session_id)) => {
                self.submit_chunk(&session_id, conn, chunk).await;
            }
            _ => {
                tracing::warn!(
                    conn = %conn,
                    size = chunk.len(),
                    "Chunk from connection that is not producing, dropped"
                );
            }
        }
    }

    /// Submit a chunk to a session; rejections are logged, never surfaced
    pub async fn submit_chunk(&self, session_id: &SessionId, conn: ConnectionId, chunk: Bytes) {
        if let Err(err) = self.chunk_relay.submit_chunk(session_id, conn, chunk).await {
            tracing::debug!(session = %session_id, conn = %conn, error = %err, "Chunk rejected");
        }
    }

    /// Run the idle-session sweep once
    pub async fn sweep(&self) -> Vec<SessionId> {
        self.sessions.sweep(self.config.idle_session_timeout).await
    }

    /// Spawn the periodic idle-session sweep
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweep_task(&self) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        let interval = self.config.sweep_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = hub.sweep().await;
                if !removed.is_empty() {
                    tracing::info!(removed = removed.len(), "Idle sweep finished");
                }
            }
        })
    }

    /// Server-wide statistics
    pub async fn stats(&self) -> ServerStats {
        let sessions = self.sessions.list_live_sessions().await;

        ServerStats {
            total_connections: self.connections.total_registered(),
            active_connections: self.connections.len().await as u64,
            total_sessions: self.sessions.total_created(),
            active_sessions: sessions.len() as u64,
            active_listeners: sessions.iter().map(|s| s.listener_count as u64).sum(),
            uptime: self.started_at.elapsed(),
        }
    }

    async fn leave_current(&self, conn: ConnectionId) {
        let Some(state) = self.connections.get(conn).await else {
            return;
        };
        if let (Role::Consumer, Some(session_id)) = (state.role, state.session) {
            self.presence.leave(&session_id, conn).await;
        }
    }

    async fn author(&self, conn: ConnectionId) -> String {
        let name = self.connections.display_name(conn).await;
        if name.is_empty() {
            format!("guest-{}", conn)
        } else {
            name
        }
    }

    async fn publish(&self, scope: Option<SessionId>, entry: ChatEntry) -> Result<(), RelayError> {
        if let Some(id) = &scope {
            if !self.sessions.contains(id).await {
                return Err(RelayError::SessionNotFound(id.clone()));
            }
        }
        self.notifier().publish(scope, entry).await;
        Ok(())
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(rx: &mut mpsc::Receiver<Outbound>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Event(event) = item {
                out.push((*event).clone());
            }
        }
        out
    }

    fn created_session(events: &[ServerEvent]) -> SessionId {
        events
            .iter()
            .find_map(|e| match e {
                ServerEvent::SessionCreated { session_id } => Some(session_id.clone()),
                _ => None,
            })
            .expect("session-created event")
    }

    #[tokio::test]
    async fn test_connect_greets_client() {
        let hub = RelayHub::new();
        let (conn, mut rx) = hub.connect().await;

        let received = events(&mut rx);
        assert_eq!(received[0], ServerEvent::Welcome { connection_id: conn });
        assert_eq!(received[1], ServerEvent::SessionListUpdated { sessions: vec![] });
        assert!(matches!(
            received[2],
            ServerEvent::ChatHistoryReplay { session_id: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_text() {
        let hub = RelayHub::new();
        let (conn, mut rx) = hub.connect().await;
        events(&mut rx);

        hub.handle_text(conn, "{\"type\":\"nope\"}").await;

        assert!(matches!(
            events(&mut rx).as_slice(),
            [ServerEvent::Error {
                kind: ErrorKind::InvalidMessage,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_producer_ready_replies_with_session() {
        let hub = RelayHub::new();
        let (producer, mut rx) = hub.connect().await;
        events(&mut rx);

        hub.handle_text(
            producer,
            r#"{"type":"producer-ready","title":"Test","codec":"audio/webm","display_name":"host"}"#,
        )
        .await;

        let session_id = created_session(&events(&mut rx));
        let session = hub.sessions().get_session(&session_id).await.unwrap();
        assert_eq!(session.producer, producer);
        assert_eq!(session.metadata.producer_name, "host");
    }

    #[tokio::test]
    async fn test_stop_by_non_producer() {
        let hub = RelayHub::new();
        let (producer, mut rx_p) = hub.connect().await;
        let (other, mut rx_o) = hub.connect().await;

        hub.handle_event(
            producer,
            ClientEvent::ProducerReady {
                title: "Test".into(),
                codec: String::new(),
                display_name: "host".into(),
            },
        )
        .await;
        let session_id = created_session(&events(&mut rx_p));
        events(&mut rx_o);

        hub.handle_event(
            other,
            ClientEvent::ProducerStop {
                session_id: session_id.clone(),
            },
        )
        .await;

        assert!(matches!(
            events(&mut rx_o).as_slice(),
            [ServerEvent::Error {
                kind: ErrorKind::Unauthorized,
                ..
            }]
        ));
        assert!(hub.sessions().contains(&session_id).await);
    }

    #[tokio::test]
    async fn test_rejected_producer_ready_keeps_display_name() {
        let hub = RelayHub::new();
        let (producer, mut rx) = hub.connect().await;
        hub.handle_event(
            producer,
            ClientEvent::ProducerReady {
                title: "Test".into(),
                codec: String::new(),
                display_name: "host".into(),
            },
        )
        .await;
        created_session(&events(&mut rx));

        hub.handle_event(
            producer,
            ClientEvent::ProducerReady {
                title: "Other".into(),
                codec: String::new(),
                display_name: "impostor".into(),
            },
        )
        .await;

        assert!(matches!(
            events(&mut rx).as_slice(),
            [ServerEvent::Error {
                kind: ErrorKind::Unauthorized,
                ..
            }]
        ));
        assert_eq!(hub.connections().display_name(producer).await, "host");
    }

    #[tokio::test]
    async fn test_rejected_join_keeps_display_name() {
        let hub = RelayHub::new();
        let (conn, mut rx) = hub.connect().await;
        events(&mut rx);

        hub.handle_event(
            conn,
            ClientEvent::ConsumerJoin {
                session_id: SessionId::from("0-gone"),
                display_name: "renamed".into(),
            },
        )
        .await;

        assert!(matches!(
            events(&mut rx).as_slice(),
            [ServerEvent::Error {
                kind: ErrorKind::NotFound,
                ..
            }]
        ));
        assert_eq!(hub.connections().display_name(conn).await, "");
    }

    #[tokio::test]
    async fn test_producer_stop() {
        let hub = RelayHub::new();
        let (producer, mut rx) = hub.connect().await;
        hub.handle_event(
            producer,
            ClientEvent::ProducerReady {
                title: "Test".into(),
                codec: String::new(),
                display_name: "host".into(),
            },
        )
        .await;
        let session_id = created_session(&events(&mut rx));

        hub.handle_event(
            producer,
            ClientEvent::ProducerStop {
                session_id: session_id.clone(),
            },
        )
        .await;

        assert!(events(&mut rx).contains(&ServerEvent::SessionEnded {
            session_id: session_id.clone(),
            reason: EndReason::ProducerStopped,
        }));
        assert!(hub.sessions().list_live_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_chat_to_unknown_session() {
        let hub = RelayHub::new();
        let (conn, mut rx) = hub.connect().await;
        events(&mut rx);

        hub.handle_event(
            conn,
            ClientEvent::ChatSend {
                session_id: Some(SessionId::from("0-gone")),
                text: "hello?".into(),
            },
        )
        .await;

        assert!(matches!(
            events(&mut rx).as_slice(),
            [ServerEvent::Error {
                kind: ErrorKind::NotFound,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_global_chat_reaches_everyone() {
        let hub = RelayHub::new();
        let (a, mut rx_a) = hub.connect().await;
        let (_b, mut rx_b) = hub.connect().await;
        events(&mut rx_a);
        events(&mut rx_b);

        hub.handle_event(
            a,
            ClientEvent::ChatSend {
                session_id: None,
                text: "hi all".into(),
            },
        )
        .await;

        for rx in [&mut rx_a, &mut rx_b] {
            match events(rx).as_slice() {
                [ServerEvent::ChatEvent { session_id: None, entry }] => {
                    assert_eq!(entry.author, format!("guest-{}", a));
                }
                other => panic!("unexpected events: {:?}", other),
            }
        }

        // Late connection gets the global history
        let (_c, mut rx_c) = hub.connect().await;
        let replay = events(&mut rx_c)
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::ChatHistoryReplay { entries, .. } => Some(entries),
                _ => None,
            })
            .unwrap();
        assert_eq!(replay.len(), 1);
    }

    #[tokio::test]
    async fn test_chunk_from_unbound_connection_ignored() {
        let hub = RelayHub::new();
        let (conn, mut rx) = hub.connect().await;
        events(&mut rx);

        hub.handle_chunk(conn, Bytes::from_static(&[0x01])).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stats() {
        let hub = RelayHub::new();
        let (producer, _rx_p) = hub.connect().await;
        let (consumer, _rx_c) = hub.connect().await;

        let session_id = hub
            .sessions()
            .create_session(producer, SessionMetadata::default())
            .await
            .unwrap();
        hub.presence()
            .join(&session_id, consumer, "guest")
            .await
            .unwrap();

        let stats = hub.stats().await;
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.active_listeners, 1);
    }
}
