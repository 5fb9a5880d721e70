//! Session entry and summary types
//!
//! This module defines the per-session state stored in the session table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::id::SessionId;
use crate::connection::{ConnectionId, OutboundSender};
use crate::protocol::ServerEvent;
use crate::stats::SessionStats;

/// Wall clock time in milliseconds since the Unix epoch
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// State of a session entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Producer is bound and the session accepts listeners
    Live,
    /// Destroyed; kept alive only by in-flight references
    Ended,
}

/// Descriptive metadata supplied by the producer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Broadcast title
    pub title: String,
    /// Media codec/type descriptor (e.g. `audio/webm;codecs=opus`)
    pub codec: String,
    /// Producer display name
    pub producer_name: String,
}

impl SessionMetadata {
    pub fn new(
        title: impl Into<String>,
        codec: impl Into<String>,
        producer_name: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            codec: codec.into(),
            producer_name: producer_name.into(),
        }
    }
}

/// A consumer subscribed to a session
#[derive(Debug, Clone)]
pub struct Listener {
    /// Display name given on join
    pub display_name: String,

    /// When the consumer joined
    pub joined_at: Instant,

    /// Outbound queue of the consumer
    pub(crate) sender: OutboundSender,

    /// Whether the cached initialization chunk has been queued for this
    /// listener; live chunks are withheld until it has
    pub(crate) primed: bool,
}

impl Listener {
    pub(crate) fn new(display_name: impl Into<String>, sender: OutboundSender) -> Self {
        Self {
            display_name: display_name.into(),
            joined_at: Instant::now(),
            sender,
            primed: true,
        }
    }
}

/// Entry for a single session in the table
pub struct SessionEntry {
    /// Session id
    pub id: SessionId,

    /// Creation order, used to sort listings
    pub(crate) seq: u64,

    /// Producer-supplied metadata
    pub metadata: SessionMetadata,

    /// The one producer connection bound to this session
    pub producer: ConnectionId,

    /// Outbound queue of the producer
    pub(crate) producer_tx: OutboundSender,

    /// First chunk ever submitted, replayed to late joiners
    ///
    /// `None` means no chunk yet; `Some` of an empty buffer is a valid cached chunk.
    pub(crate) init_chunk: Option<Bytes>,

    /// Subscribed consumers
    pub(crate) listeners: HashMap<ConnectionId, Listener>,

    /// When the session was created
    pub created_at: Instant,

    /// Creation time as Unix milliseconds (for clients)
    pub created_at_ms: u64,

    /// Last producer activity (creation or chunk submission)
    pub last_activity: Instant,

    /// Relay statistics
    pub stats: SessionStats,

    /// Current state
    pub state: SessionState,
}

impl SessionEntry {
    /// Create a live session entry
    pub(crate) fn new(
        id: SessionId,
        seq: u64,
        metadata: SessionMetadata,
        producer: ConnectionId,
        producer_tx: OutboundSender,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            seq,
            metadata,
            producer,
            producer_tx,
            init_chunk: None,
            listeners: HashMap::new(),
            created_at: now,
            created_at_ms: unix_millis(),
            last_activity: now,
            stats: SessionStats::default(),
            state: SessionState::Live,
        }
    }

    /// Number of consumers currently bound
    ///
    /// Derived from the listener set, so it can never drift or go negative.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Check if a consumer is subscribed
    pub fn has_listener(&self, conn: ConnectionId) -> bool {
        self.listeners.contains_key(&conn)
    }

    /// Check if the session has been destroyed
    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }

    /// Cached initialization chunk, if one has been submitted
    pub fn init_chunk(&self) -> Option<&Bytes> {
        self.init_chunk.as_ref()
    }

    /// Time since creation
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Record producer activity
    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Deliver an event to the producer and every listener
    ///
    /// Each recipient is delivered independently; returns how many queued it.
    pub(crate) fn notify_members(&self, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let mut queued = 0;

        if self.producer_tx.shared_event(&event).is_queued() {
            queued += 1;
        }
        for listener in self.listeners.values() {
            if listener.sender.shared_event(&event).is_queued() {
                queued += 1;
            }
        }
        queued
    }

    /// Mark the session ended and release its listeners and cached chunk
    pub(crate) fn end(&mut self) -> Vec<(ConnectionId, Listener)> {
        self.state = SessionState::Ended;
        self.init_chunk = None;
        self.listeners.drain().collect()
    }

    /// Summary for session listings
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            title: self.metadata.title.clone(),
            codec: self.metadata.codec.clone(),
            producer_name: self.metadata.producer_name.clone(),
            listener_count: self.listener_count(),
            uptime_secs: self.uptime().as_secs(),
            created_at_ms: self.created_at_ms,
        }
    }

    /// Point-in-time copy of the session state
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut listeners: Vec<ConnectionId> = self.listeners.keys().copied().collect();
        listeners.sort();

        SessionSnapshot {
            id: self.id.clone(),
            metadata: self.metadata.clone(),
            producer: self.producer,
            listeners,
            init_chunk: self.init_chunk.clone(),
            uptime: self.uptime(),
            created_at_ms: self.created_at_ms,
            stats: self.stats.clone(),
        }
    }
}

/// Listing entry for one live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub title: String,
    pub codec: String,
    pub producer_name: String,
    pub listener_count: usize,
    pub uptime_secs: u64,
    pub created_at_ms: u64,
}

/// Point-in-time copy of a session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub metadata: SessionMetadata,
    pub producer: ConnectionId,
    /// Bound consumers, sorted by id
    pub listeners: Vec<ConnectionId>,
    pub init_chunk: Option<Bytes>,
    pub uptime: Duration,
    pub created_at_ms: u64,
    pub stats: SessionStats,
}

impl SessionSnapshot {
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
