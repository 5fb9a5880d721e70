//! Chunk relay
//!
//! Forwards media chunks from a session's producer to every subscribed
//! consumer and keeps the session's initialization chunk.
//!
//! Decoders for the stream need the first chunk (container header / codec
//! setup) before any later chunk is decodable. The first chunk submitted to a
//! session is therefore cached verbatim and replayed to each consumer as it
//! joins, inside the same critical section that attaches the consumer. Because
//! live fan-out also runs under that lock and each consumer's queue is FIFO, a
//! late joiner always sees the cached chunk before any live chunk.
//!
//! Delivery is best-effort: a consumer whose queue is full loses that chunk,
//! and nobody else is slowed down. If even the cached chunk could not be
//! queued on join, the consumer stays unprimed and live chunks are withheld
//! from it until the cached chunk gets through.

use bytes::Bytes;

use crate::connection::ConnectionId;
use crate::error::RelayError;
use crate::session::{SessionEntry, SessionId, SessionTable};

/// Producer-to-consumers chunk forwarding
#[derive(Clone)]
pub struct ChunkRelay {
    sessions: SessionTable,
}

impl ChunkRelay {
    pub fn new(sessions: SessionTable) -> Self {
        Self { sessions }
    }

    /// Submit a chunk from `producer` to a session
    ///
    /// Rejected with `SessionNotFound` for unknown sessions and `Unauthorized`
    /// when `producer` is not the session's bound producer; a rejected chunk
    /// is neither cached nor forwarded. Returns how many consumers queued the
    /// chunk.
    pub async fn submit_chunk(
        &self,
        session_id: &SessionId,
        producer: ConnectionId,
        chunk: Bytes,
    ) -> Result<usize, RelayError> {
        let entry_arc = self
            .sessions
            .entry(session_id)
            .await
            .ok_or_else(|| RelayError::SessionNotFound(session_id.clone()))?;

        let mut entry = entry_arc.lock().await;
        if entry.is_ended() {
            return Err(RelayError::SessionNotFound(session_id.clone()));
        }

        if entry.producer != producer {
            tracing::warn!(
                session = %session_id,
                producer = %entry.producer,
                sender = %producer,
                "Rejected chunk from connection that is not the session producer"
            );
            return Err(RelayError::Unauthorized {
                conn: producer,
                action: "submit chunks to this session",
            });
        }

        Ok(fan_out(&mut entry, chunk))
    }

    /// Cached initialization chunk of a session
    pub async fn cached_chunk(&self, session_id: &SessionId) -> Option<Bytes> {
        let entry_arc = self.sessions.entry(session_id).await?;
        let entry = entry_arc.lock().await;
        entry.init_chunk().cloned()
    }
}

/// Replay the cached chunk to a consumer that was just attached
///
/// Must be called while holding the session lock that attached `consumer`.
/// Returns true if a cached chunk was queued.
pub(crate) fn on_consumer_join(entry: &mut SessionEntry, consumer: ConnectionId) -> bool {
    let SessionEntry {
        id,
        init_chunk,
        listeners,
        stats,
        ..
    } = entry;

    let Some(listener) = listeners.get_mut(&consumer) else {
        return false;
    };

    let Some(init) = init_chunk.as_ref() else {
        // The first live chunk will become the cache and reach this consumer live
        listener.primed = true;
        return false;
    };

    let delivery = listener.sender.chunk(init.clone());
    stats.record_delivery(delivery);
    listener.primed = delivery.is_queued();

    if !listener.primed {
        tracing::debug!(
            session = %id,
            consumer = %consumer,
            "Initialization chunk deferred, consumer queue full"
        );
    }
    listener.primed
}

/// Cache (if first) and forward a chunk to every listener
fn fan_out(entry: &mut SessionEntry, chunk: Bytes) -> usize {
    entry.touch();
    entry.stats.record_chunk(chunk.len());

    if entry.init_chunk.is_none() {
        tracing::debug!(
            session = %entry.id,
            size = chunk.len(),
            "Cached initialization chunk"
        );
        entry.init_chunk = Some(chunk.clone());
    }

    let SessionEntry {
        init_chunk,
        listeners,
        stats,
        ..
    } = entry;

    let mut queued = 0;
    for listener in listeners.values_mut() {
        if !listener.primed {
            match init_chunk.as_ref() {
                Some(init) => {
                    let delivery = listener.sender.chunk(init.clone());
                    stats.record_delivery(delivery);
                    if !delivery.is_queued() {
                        continue;
                    }
                    listener.primed = true;
                }
                None => listener.primed = true,
            }
        }

        let delivery = listener.sender.chunk(chunk.clone());
        stats.record_delivery(delivery);
        if delivery.is_queued() {
            queued += 1;
        }
    }

    queued
}
