//! Per-connection state
//!
//! Tracks a connection's role and its membership in a session from connect
//! to disconnect.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::outbound::OutboundSender;
use crate::session::SessionId;

/// Opaque identifier for one live transport connection
///
/// Allocated from a monotonic counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a connection relative to the sessions it participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Connected but neither producing nor listening
    Unbound,
    /// Producer of exactly one live session
    Producer,
    /// Consumer joined to exactly one session
    Consumer,
}

/// Membership lifecycle of a consumer relative to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipPhase {
    /// Not joined to anything
    Unbound,
    /// Join in progress
    Joining,
    /// Joined and receiving chunks
    Joined,
    /// Left or was released when its session ended
    Left,
}

/// Registry entry for one connection
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique connection ID
    pub id: ConnectionId,

    /// Display name (set by producer-ready / consumer-join)
    pub display_name: String,

    /// Current role
    pub role: Role,

    /// Session this connection is bound to, if any
    pub session: Option<SessionId>,

    /// Consumer membership phase
    pub phase: MembershipPhase,

    /// When the transport connected
    pub connected_at: Instant,

    /// Outbound queue
    sender: OutboundSender,
}

impl Connection {
    /// Create an unbound connection
    pub fn new(id: ConnectionId, sender: OutboundSender) -> Self {
        Self {
            id,
            display_name: String::new(),
            role: Role::Unbound,
            session: None,
            phase: MembershipPhase::Unbound,
            connected_at: Instant::now(),
            sender,
        }
    }

    /// Outbound queue for this connection
    pub fn sender(&self) -> &OutboundSender {
        &self.sender
    }

    /// Check if bound (as producer or consumer) to the given session
    pub fn is_bound_to(&self, session: &SessionId) -> bool {
        self.session.as_ref() == Some(session)
    }

    /// Check if this connection is producing the given session
    pub fn is_producer_of(&self, session: &SessionId) -> bool {
        self.role == Role::Producer && self.is_bound_to(session)
    }

    pub(crate) fn bind(&mut self, role: Role, session: SessionId) {
        self.role = role;
        self.session = Some(session);
        if role == Role::Consumer {
            self.phase = MembershipPhase::Joined;
        }
    }

    pub(crate) fn unbind(&mut self) {
        if self.role == Role::Consumer {
            self.phase = MembershipPhase::Left;
        }
        self.role = Role::Unbound;
        self.session = None;
    }

    /// How long the transport has been connected
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
