//! Statistics and metrics for relay sessions

use std::time::Duration;

use crate::connection::Delivery;

/// Per-session relay statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Chunks accepted from the producer
    pub chunks_received: u64,
    /// Bytes accepted from the producer
    pub bytes_received: u64,
    /// Chunk deliveries queued to listeners (including init chunk replays)
    pub chunks_delivered: u64,
    /// Chunk deliveries dropped because a listener's queue was full
    pub chunks_dropped: u64,
    /// Successful joins over the session's lifetime
    pub joins: u64,
    /// Highest concurrent listener count
    pub peak_listeners: usize,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk submitted by the producer
    pub fn record_chunk(&mut self, size: usize) {
        self.chunks_received += 1;
        self.bytes_received += size as u64;
    }

    /// Record the outcome of delivering a chunk to one listener
    pub fn record_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Queued => self.chunks_delivered += 1,
            Delivery::Dropped => self.chunks_dropped += 1,
            Delivery::Closed => {}
        }
    }

    /// Record a join that brought the session to `listeners`
    pub fn record_join(&mut self, listeners: usize) {
        self.joins += 1;
        self.peak_listeners = self.peak_listeners.max(listeners);
    }

    /// Fraction of chunk deliveries that were dropped
    pub fn drop_ratio(&self) -> f64 {
        let attempts = self.chunks_delivered + self.chunks_dropped;
        if attempts > 0 {
            self.chunks_dropped as f64 / attempts as f64
        } else {
            0.0
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Total sessions ever created
    pub total_sessions: u64,
    /// Current live sessions
    pub active_sessions: u64,
    /// Current listeners across all sessions
    pub active_listeners: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }
}
