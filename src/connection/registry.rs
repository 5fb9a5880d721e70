//! Connection registry implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::outbound::{outbound_channel, Outbound, OutboundSender};
use super::state::{Connection, ConnectionId, MembershipPhase, Role};
use crate::error::RelayError;
use crate::session::SessionId;

/// Registry of all live connections
///
/// Cheap to clone; clones share the same map. Callers must not hold a session
/// entry lock while waiting on anything else *after* touching the registry:
/// the lock order is session map, then session entry, then registry.
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new connection with an outbound queue of the given capacity
    pub async fn register(&self, queue_capacity: usize) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = outbound_channel(id, queue_capacity);

        self.connections
            .write()
            .await
            .insert(id, Connection::new(id, tx));

        tracing::debug!(conn = %id, "Connection registered");
        (id, rx)
    }

    /// Remove a connection, returning its final state
    ///
    /// Returns `None` if it was already removed, so disconnect handling runs
    /// at most once per connection.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(conn = %id, "Connection unregistered");
        }
        removed
    }

    /// Snapshot of a connection's state
    pub async fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Check whether a connection is still registered
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Outbound sender for a connection
    pub async fn sender(&self, id: ConnectionId) -> Option<OutboundSender> {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|c| c.sender().clone())
    }

    /// Outbound senders for every live connection
    pub async fn senders(&self) -> Vec<OutboundSender> {
        self.connections
            .read()
            .await
            .values()
            .map(|c| c.sender().clone())
            .collect()
    }

    /// Display name of a connection (empty if unknown or unset)
    pub async fn display_name(&self, id: ConnectionId) -> String {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|c| c.display_name.clone())
            .unwrap_or_default()
    }

    /// Update a connection's display name
    pub async fn set_display_name(&self, id: ConnectionId, name: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(&id) {
            conn.display_name = name.to_string();
        }
    }

    /// Bind a connection as the producer of a session
    pub async fn bind_producer(
        &self,
        id: ConnectionId,
        session: SessionId,
    ) -> Result<(), RelayError> {
        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&id)
            .ok_or(RelayError::ConnectionNotFound(id))?;

        match conn.role {
            Role::Producer => Err(RelayError::AlreadyProducing(id)),
            Role::Consumer => Err(RelayError::Unauthorized {
                conn: id,
                action: "produce while joined to a session",
            }),
            Role::Unbound => {
                conn.bind(Role::Producer, session);
                Ok(())
            }
        }
    }

    /// Bind a connection as a consumer of a session
    pub async fn bind_consumer(
        &self,
        id: ConnectionId,
        session: SessionId,
    ) -> Result<(), RelayError> {
        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&id)
            .ok_or(RelayError::ConnectionNotFound(id))?;

        match conn.role {
            Role::Producer => Err(RelayError::Unauthorized {
                conn: id,
                action: "join a session while producing",
            }),
            Role::Consumer if !conn.is_bound_to(&session) => Err(RelayError::Unauthorized {
                conn: id,
                action: "join two sessions at once",
            }),
            Role::Consumer | Role::Unbound => {
                conn.bind(Role::Consumer, session);
                Ok(())
            }
        }
    }

    /// Set the membership phase of a connection
    pub async fn set_phase(&self, id: ConnectionId, phase: MembershipPhase) {
        if let Some(conn) = self.connections.write().await.get_mut(&id) {
            conn.phase = phase;
        }
    }

    /// Unbind a connection, but only if it is still bound to `session`
    ///
    /// Returns true if the binding was cleared.
    pub async fn unbind(&self, id: ConnectionId, session: &SessionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&id) {
            Some(conn) if conn.is_bound_to(session) => {
                conn.unbind();
                true
            }
            _ => false,
        }
    }

    /// Number of live connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Check if no connections are registered
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Total number of connections ever registered
    pub fn total_registered(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
