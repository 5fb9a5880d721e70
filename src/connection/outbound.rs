//! Outbound delivery queue
//!
//! Each connection owns a bounded `mpsc` channel drained by its writer task.
//! All deliveries use `try_send`: a saturated queue drops the item for that
//! connection only, and a closed queue means the connection is gone. Nothing
//! is ever retried.
//!
//! The channel holds `capacity + CONTROL_RESERVE` items. Media chunks are only
//! admitted while more than `CONTROL_RESERVE` slots are free, so a consumer
//! backed up on chunks still receives lifecycle events such as
//! `session-ended`, in order behind the chunks already queued.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::state::ConnectionId;
use crate::protocol::ServerEvent;

/// Queue slots only control events may use
pub const CONTROL_RESERVE: usize = 32;

/// Item queued for a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Control event, serialized as a JSON text frame
    Event(Arc<ServerEvent>),
    /// Media chunk, sent as a binary frame
    Chunk(Bytes),
    /// Ask the writer to close the transport
    Close,
}

/// Outcome of a single non-blocking delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Item was placed in the connection's queue
    Queued,
    /// Queue was full; item dropped for this connection
    Dropped,
    /// Connection has gone away
    Closed,
}

impl Delivery {
    pub fn is_queued(self) -> bool {
        self == Delivery::Queued
    }
}

/// Sending half of a connection's outbound queue
#[derive(Debug, Clone)]
pub struct OutboundSender {
    conn: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl OutboundSender {
    /// Connection this sender delivers to
    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    /// Try to enqueue an item without waiting
    pub fn deliver(&self, item: Outbound) -> Delivery {
        if matches!(item, Outbound::Chunk(_))
            && !self.tx.is_closed()
            && self.tx.capacity() <= CONTROL_RESERVE
        {
            tracing::trace!(conn = %self.conn, "Chunk slots full, dropping");
            return Delivery::Dropped;
        }

        match self.tx.try_send(item) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                tracing::trace!(conn = %self.conn, "Outbound queue full, dropping");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Enqueue a control event
    pub fn event(&self, event: ServerEvent) -> Delivery {
        self.deliver(Outbound::Event(Arc::new(event)))
    }

    /// Enqueue a shared control event (used by fan-out)
    pub fn shared_event(&self, event: &Arc<ServerEvent>) -> Delivery {
        self.deliver(Outbound::Event(Arc::clone(event)))
    }

    /// Enqueue a media chunk
    pub fn chunk(&self, chunk: Bytes) -> Delivery {
        self.deliver(Outbound::Chunk(chunk))
    }

    /// Check whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a bounded outbound queue for a connection
///
/// `capacity` is the number of chunk slots; control events get
/// [`CONTROL_RESERVE`] more on top.
pub fn outbound_channel(
    conn: ConnectionId,
    capacity: usize,
) -> (OutboundSender, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(capacity.max(1) + CONTROL_RESERVE);
    (OutboundSender { conn, tx }, rx)
}
