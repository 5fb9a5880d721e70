//! Presence coordinator
//!
//! Processes join, leave and disconnect events and keeps listener counts
//! consistent. Listener counts are derived from each session's listener set,
//! and every change to that set happens under the session's mutex, so
//! concurrent joins and leaves on one session cannot lose updates.
//!
//! Disconnect handling runs at most once per connection: the registry entry is
//! removed first, and only the caller that removed it performs the leave or
//! session teardown. A consumer released by a session teardown is already gone
//! from the listener set, so a later leave for it is a no-op rather than a
//! second decrement.

use crate::connection::{Connection, ConnectionId, ConnectionRegistry, MembershipPhase, Role};
use crate::error::RelayError;
use crate::notify::{ChatEntry, Notifier};
use crate::protocol::{EndReason, ServerEvent};
use crate::relay;
use crate::session::{Listener, SessionEntry, SessionId, SessionTable};

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub session_id: SessionId,
    /// Listener count after the join
    pub listener_count: usize,
    /// The connection was already joined to this session; nothing changed
    pub already_joined: bool,
    /// The cached initialization chunk was queued to the consumer
    pub received_init_chunk: bool,
}

/// Join/leave/disconnect handling
#[derive(Clone)]
pub struct Presence {
    sessions: SessionTable,
    connections: ConnectionRegistry,
    notifier: Notifier,
    max_listeners: usize,
}

impl Presence {
    /// Create a coordinator; `max_listeners` of 0 means unlimited
    pub fn new(sessions: SessionTable, connections: ConnectionRegistry, max_listeners: usize) -> Self {
        let notifier = sessions.notifier().clone();
        Self {
            sessions,
            connections,
            notifier,
            max_listeners,
        }
    }

    /// Join `consumer` to a session
    ///
    /// A consumer already joined to a different session leaves it first.
    /// Joining the session it is already in changes nothing.
    pub async fn join(
        &self,
        session_id: &SessionId,
        consumer: ConnectionId,
        display_name: &str,
    ) -> Result<JoinOutcome, RelayError> {
        let conn = self
            .connections
            .get(consumer)
            .await
            .ok_or(RelayError::ConnectionNotFound(consumer))?;

        match (conn.role, conn.session.as_ref()) {
            (Role::Producer, _) => {
                return Err(RelayError::Unauthorized {
                    conn: consumer,
                    action: "join a session while producing",
                });
            }
            (Role::Consumer, Some(current)) if current == session_id => {
                let listener_count = self.sessions.get_session(session_id).await?.listener_count();
                return Ok(JoinOutcome {
                    session_id: session_id.clone(),
                    listener_count,
                    already_joined: true,
                    received_init_chunk: false,
                });
            }
            (Role::Consumer, Some(current)) => {
                self.leave(current, consumer).await;
            }
            _ => {}
        }

        let entry_arc = self
            .sessions
            .entry(session_id)
            .await
            .ok_or_else(|| RelayError::SessionNotFound(session_id.clone()))?;

        self.connections
            .set_phase(consumer, MembershipPhase::Joining)
            .await;

        let outcome = {
            let mut entry = entry_arc.lock().await;
            self.attach(&mut entry, &conn, display_name).await
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.connections
                    .set_phase(consumer, MembershipPhase::Unbound)
                    .await;
                return Err(err);
            }
        };

        tracing::info!(
            session = %session_id,
            consumer = %consumer,
            listeners = outcome.listener_count,
            init_chunk = outcome.received_init_chunk,
            "Consumer joined"
        );

        self.notifier.replay(consumer, Some(session_id.clone())).await;
        self.notifier
            .publish(
                Some(session_id.clone()),
                ChatEntry::system(format!("{} joined", display_name)),
            )
            .await;
        self.sessions.announce().await;

        Ok(outcome)
    }

    /// Attach a consumer inside the session's critical section
    ///
    /// Inserting into the listener set, binding the connection and replaying
    /// the cached chunk happen together so no live chunk can overtake the
    /// cached one.
    async fn attach(
        &self,
        entry: &mut SessionEntry,
        conn: &Connection,
        display_name: &str,
    ) -> Result<JoinOutcome, RelayError> {
        if entry.is_ended() {
            return Err(RelayError::SessionNotFound(entry.id.clone()));
        }

        if self.max_listeners > 0 && entry.listener_count() >= self.max_listeners {
            return Err(RelayError::SessionFull {
                session: entry.id.clone(),
                capacity: self.max_listeners,
            });
        }

        self.connections
            .bind_consumer(conn.id, entry.id.clone())
            .await?;

        entry
            .listeners
            .insert(conn.id, Listener::new(display_name, conn.sender().clone()));
        let listener_count = entry.listener_count();
        entry.stats.record_join(listener_count);

        let _ = conn.sender().event(ServerEvent::Joined {
            session_id: entry.id.clone(),
            title: entry.metadata.title.clone(),
            codec: entry.metadata.codec.clone(),
            producer_id: entry.producer,
            producer_name: entry.metadata.producer_name.clone(),
            listener_count,
        });

        let received_init_chunk = relay::on_consumer_join(entry, conn.id);

        let _ = entry
            .producer_tx
            .event(ServerEvent::NewConsumerForSignaling {
                session_id: entry.id.clone(),
                consumer_id: conn.id,
                display_name: display_name.to_string(),
            });

        entry.notify_members(ServerEvent::ListenerCountChanged {
            session_id: entry.id.clone(),
            listener_count,
        });

        Ok(JoinOutcome {
            session_id: entry.id.clone(),
            listener_count,
            already_joined: false,
            received_init_chunk,
        })
    }

    /// Remove `consumer` from a session
    ///
    /// Idempotent: returns false (and changes nothing) if the consumer is not
    /// currently joined to that session.
    pub async fn leave(&self, session_id: &SessionId, consumer: ConnectionId) -> bool {
        let Some(entry_arc) = self.sessions.entry(session_id).await else {
            return false;
        };

        let (listener, listener_count) = {
            let mut entry = entry_arc.lock().await;
            let Some(listener) = entry.listeners.remove(&consumer) else {
                return false;
            };

            self.connections.unbind(consumer, session_id).await;

            let listener_count = entry.listener_count();
            entry.notify_members(ServerEvent::ListenerCountChanged {
                session_id: session_id.clone(),
                listener_count,
            });
            (listener, listener_count)
        };

        tracing::info!(
            session = %session_id,
            consumer = %consumer,
            listeners = listener_count,
            "Consumer left"
        );

        self.notifier
            .publish(
                Some(session_id.clone()),
                ChatEntry::system(format!("{} left", listener.display_name)),
            )
            .await;
        self.sessions.announce().await;
        true
    }

    /// Handle a transport disconnect
    ///
    /// Producer: destroys its session. Consumer: leaves its session. Unbound:
    /// nothing. Returns the connection's final state, or `None` if the
    /// disconnect was already handled.
    pub async fn on_disconnect(&self, conn_id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.unregister(conn_id).await?;

        match (conn.role, conn.session.as_ref()) {
            (Role::Producer, Some(session_id)) => {
                if self.sessions.producer_of(session_id).await == Some(conn_id) {
                    self.sessions
                        .destroy_session(session_id, EndReason::ProducerDisconnected)
                        .await;
                }
            }
            (Role::Consumer, Some(session_id)) => {
                self.leave(session_id, conn_id).await;
            }
            _ => {}
        }

        tracing::debug!(conn = %conn_id, role = ?conn.role, "Disconnect handled");
        Some(conn)
    }
}

/// Unbind every consumer released by a session teardown
pub(crate) async fn release_listeners(
    connections: &ConnectionRegistry,
    session_id: &SessionId,
    released: &[(ConnectionId, Listener)],
) {
    for (consumer, _) in released {
        connections.unbind(*consumer, session_id).await;
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::connection::Outbound;
    use crate::session::SessionMetadata;

    struct Fixture {
        connections: ConnectionRegistry,
        sessions: SessionTable,
        presence: Presence,
        producer: ConnectionId,
        session: SessionId,
        producer_rx: mpsc::Receiver<Outbound>,
    }

    async fn fixture(max_listeners: usize) -> Fixture {
        let connections = ConnectionRegistry::new();
        let sessions = SessionTable::new(connections.clone(), 10);
        let (producer, producer_rx) = connections.register(256).await;
        let session = sessions
            .create_session(producer, SessionMetadata::new("Test", "audio/webm", "host"))
            .await
            .unwrap();

        Fixture {
            presence: Presence::new(sessions.clone(), connections.clone(), max_listeners),
            connections,
            sessions,
            producer,
            session,
            producer_rx,
        }
    }

    async fn count(f: &Fixture) -> usize {
        f.sessions
            .get_session(&f.session)
            .await
            .unwrap()
            .listener_count()
    }

    fn events(rx: &mut mpsc::Receiver<Outbound>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Event(event) = item {
                out.push((*event).clone());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let f = fixture(0).await;
        let (consumer, _rx) = f.connections.register(64).await;

        let outcome = f.presence.join(&f.session, consumer, "guest").await.unwrap();
        assert_eq!(outcome.listener_count, 1);
        assert!(!outcome.already_joined);
        assert!(!outcome.received_init_chunk);

        let conn = f.connections.get(consumer).await.unwrap();
        assert_eq!(conn.role, Role::Consumer);
        assert_eq!(conn.phase, MembershipPhase::Joined);

        assert!(f.presence.leave(&f.session, consumer).await);
        assert_eq!(count(&f).await, 0);

        let conn = f.connections.get(consumer).await.unwrap();
        assert_eq!(conn.role, Role::Unbound);
        assert_eq!(conn.phase, MembershipPhase::Left);
    }

    #[tokio::test]
    async fn test_leave_idempotent() {
        let f = fixture(0).await;
        let (a, _rx_a) = f.connections.register(64).await;
        let (b, _rx_b) = f.connections.register(64).await;
        f.presence.join(&f.session, a, "a").await.unwrap();
        f.presence.join(&f.session, b, "b").await.unwrap();

        assert!(f.presence.leave(&f.session, a).await);
        assert!(!f.presence.leave(&f.session, a).await);
        assert_eq!(count(&f).await, 1);
    }

    #[tokio::test]
    async fn test_rejoin_same_session_is_noop() {
        let f = fixture(0).await;
        let (consumer, _rx) = f.connections.register(64).await;

        f.presence.join(&f.session, consumer, "guest").await.unwrap();
        let again = f.presence.join(&f.session, consumer, "guest").await.unwrap();

        assert!(again.already_joined);
        assert_eq!(again.listener_count, 1);
        assert_eq!(count(&f).await, 1);
    }

    #[tokio::test]
    async fn test_join_unknown_session() {
        let f = fixture(0).await;
        let (consumer, _rx) = f.connections.register(64).await;

        let result = f
            .presence
            .join(&SessionId::from("0-missing"), consumer, "guest")
            .await;

        assert!(matches!(result, Err(RelayError::SessionNotFound(_))));
        let conn = f.connections.get(consumer).await.unwrap();
        assert_eq!(conn.role, Role::Unbound);
    }

    #[tokio::test]
    async fn test_session_full() {
        let f = fixture(1).await;
        let (a, _rx_a) = f.connections.register(64).await;
        let (b, _rx_b) = f.connections.register(64).await;

        f.presence.join(&f.session, a, "a").await.unwrap();
        let result = f.presence.join(&f.session, b, "b").await;

        assert_eq!(
            result,
            Err(RelayError::SessionFull {
                session: f.session.clone(),
                capacity: 1,
            })
        );
        assert_eq!(count(&f).await, 1);
        let conn = f.connections.get(b).await.unwrap();
        assert_eq!(conn.phase, MembershipPhase::Unbound);
    }

    #[tokio::test]
    async fn test_producer_cannot_join() {
        let f = fixture(0).await;
        let result = f.presence.join(&f.session, f.producer, "host").await;
        assert!(matches!(result, Err(RelayError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_join_notifies_producer() {
        let mut f = fixture(0).await;
        let (consumer, _rx) = f.connections.register(64).await;
        events(&mut f.producer_rx);

        f.presence.join(&f.session, consumer, "guest").await.unwrap();

        let received = events(&mut f.producer_rx);
        assert!(received.contains(&ServerEvent::NewConsumerForSignaling {
            session_id: f.session.clone(),
            consumer_id: consumer,
            display_name: "guest".into(),
        }));
        assert!(received.contains(&ServerEvent::ListenerCountChanged {
            session_id: f.session.clone(),
            listener_count: 1,
        }));
    }

    #[tokio::test]
    async fn test_switch_sessions() {
        let f = fixture(0).await;
        let (other_producer, _rx_p) = f.connections.register(64).await;
        let other = f
            .sessions
            .create_session(other_producer, SessionMetadata::default())
            .await
            .unwrap();
        let (consumer, _rx) = f.connections.register(64).await;

        f.presence.join(&f.session, consumer, "guest").await.unwrap();
        f.presence.join(&other, consumer, "guest").await.unwrap();

        assert_eq!(count(&f).await, 0);
        assert_eq!(
            f.sessions.get_session(&other).await.unwrap().listener_count(),
            1
        );
    }

    #[tokio::test]
    async fn test_consumer_disconnect_once() {
        let f = fixture(0).await;
        let (a, _rx_a) = f.connections.register(64).await;
        let (b, _rx_b) = f.connections.register(64).await;
        f.presence.join(&f.session, a, "a").await.unwrap();
        f.presence.join(&f.session, b, "b").await.unwrap();

        assert!(f.presence.on_disconnect(a).await.is_some());
        assert!(f.presence.on_disconnect(a).await.is_none());
        assert_eq!(count(&f).await, 1);
    }

    #[tokio::test]
    async fn test_producer_disconnect_destroys_session() {
        let f = fixture(0).await;
        let (consumer, mut rx) = f.connections.register(64).await;
        f.presence.join(&f.session, consumer, "guest").await.unwrap();
        events(&mut rx);

        f.presence.on_disconnect(f.producer).await;

        assert!(!f.sessions.contains(&f.session).await);
        let conn = f.connections.get(consumer).await.unwrap();
        assert_eq!(conn.role, Role::Unbound);
        assert!(events(&mut rx).contains(&ServerEvent::SessionEnded {
            session_id: f.session.clone(),
            reason: EndReason::ProducerDisconnected,
        }));

        // Leaving a destroyed session is a no-op
        assert!(!f.presence.leave(&f.session, consumer).await);
    }

    #[tokio::test]
    async fn test_unbound_disconnect() {
        let f = fixture(0).await;
        let (idle, _rx) = f.connections.register(64).await;

        let conn = f.presence.on_disconnect(idle).await.unwrap();
        assert_eq!(conn.role, Role::Unbound);
        assert_eq!(count(&f).await, 0);
    }

    #[tokio::test]
    async fn test_join_replays_cached_chunk() {
        let f = fixture(0).await;
        let relay = crate::relay::ChunkRelay::new(f.sessions.clone());
        relay
            .submit_chunk(&f.session, f.producer, Bytes::from_static(&[0xAA]))
            .await
            .unwrap();

        let (consumer, mut rx) = f.connections.register(64).await;
        let outcome = f.presence.join(&f.session, consumer, "guest").await.unwrap();
        assert!(outcome.received_init_chunk);

        let first_chunk = std::iter::from_fn(|| rx.try_recv().ok()).find_map(|item| match item {
            Outbound::Chunk(data) => Some(data),
            _ => None,
        });
        assert_eq!(first_chunk, Some(Bytes::from_static(&[0xAA])));
    }
}
