//! Events sent to clients

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;
use crate::error::{ErrorKind, RelayError};
use crate::notify::ChatEntry;
use crate::session::{SessionId, SessionSummary};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// Producer sent producer-stop
    ProducerStopped,
    /// Producer connection went away
    ProducerDisconnected,
    /// Removed by the idle sweep
    Idle,
}

/// Outbound control event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First event on every connection
    Welcome { connection_id: ConnectionId },

    /// Reply to producer-ready
    SessionCreated { session_id: SessionId },

    /// Full list of live sessions
    SessionListUpdated { sessions: Vec<SessionSummary> },

    /// Reply to consumer-join
    Joined {
        session_id: SessionId,
        title: String,
        codec: String,
        producer_id: ConnectionId,
        producer_name: String,
        listener_count: usize,
    },

    /// Listener count of a session changed
    ListenerCountChanged {
        session_id: SessionId,
        listener_count: usize,
    },

    /// Sent to a producer when a consumer joins, so a direct media path can be negotiated
    NewConsumerForSignaling {
        session_id: SessionId,
        consumer_id: ConnectionId,
        display_name: String,
    },

    /// Relayed negotiation message
    SignalReceived {
        from: ConnectionId,
        payload: serde_json::Value,
    },

    /// Session was destroyed
    SessionEnded {
        session_id: SessionId,
        reason: EndReason,
    },

    /// Chat message or system notice
    ChatEvent {
        session_id: Option<SessionId>,
        entry: ChatEntry,
    },

    /// Virtual gift
    GiftEvent {
        session_id: Option<SessionId>,
        entry: ChatEntry,
    },

    /// Recent history for a scope, oldest first
    ChatHistoryReplay {
        session_id: Option<SessionId>,
        entries: Vec<ChatEntry>,
    },

    /// A request from this connection failed
    Error { kind: ErrorKind, message: String },
}

impl ServerEvent {
    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&RelayError> for ServerEvent {
    fn from(err: &RelayError) -> Self {
        ServerEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_tagged() {
        let event = ServerEvent::ListenerCountChanged {
            session_id: SessionId::from("1-abc"),
            listener_count: 3,
        };

        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "listener-count-changed");
        assert_eq!(json["session_id"], "1-abc");
        assert_eq!(json["listener_count"], 3);
    }

    #[test]
    fn test_encode_session_ended() {
        let event = ServerEvent::SessionEnded {
            session_id: SessionId::from("1-abc"),
            reason: EndReason::ProducerDisconnected,
        };

        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "session-ended");
        assert_eq!(json["reason"], "producer-disconnected");
    }

    #[test]
    fn test_error_from_relay_error() {
        let err = RelayError::SessionNotFound(SessionId::from("9-zzz"));
        let event = ServerEvent::from(&err);

        assert_eq!(
            event,
            ServerEvent::Error {
                kind: ErrorKind::NotFound,
                message: "session not found: 9-zzz".into(),
            }
        );
    }
}
