//! Signaling relay
//!
//! Store-and-forward of negotiation messages between two connections, used by
//! a producer and a consumer to set up a direct media path. Payloads are
//! opaque JSON and never inspected. Delivery is best-effort: a message for a
//! connection that has gone away is dropped without telling the sender.

use crate::connection::{ConnectionId, ConnectionRegistry, Delivery};
use crate::protocol::ServerEvent;

/// Opaque message forwarding between connections
#[derive(Clone)]
pub struct SignalingRelay {
    connections: ConnectionRegistry,
}

impl SignalingRelay {
    pub fn new(connections: ConnectionRegistry) -> Self {
        Self { connections }
    }

    /// Forward `payload` to `to`, tagged with `from` as the sender
    ///
    /// Returns true if the message was queued for the recipient. Messages
    /// from a sender that is no longer registered are dropped.
    pub async fn relay(
        &self,
        from: ConnectionId,
        to: ConnectionId,
        payload: serde_json::Value,
    ) -> bool {
        if !self.connections.contains(from).await {
            tracing::debug!(from = %from, "Signal from unknown connection dropped");
            return false;
        }

        let Some(tx) = self.connections.sender(to).await else {
            tracing::debug!(from = %from, to = %to, "Signal dropped, recipient not connected");
            return false;
        };

        match tx.event(ServerEvent::SignalReceived { from, payload }) {
            Delivery::Queued => true,
            delivery => {
                tracing::debug!(from = %from, to = %to, ?delivery, "Signal dropped");
                false
            }
        }
    }
}
