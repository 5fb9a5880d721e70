//! Events sent by clients

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;
use crate::session::SessionId;

/// Inbound control event
///
/// `session_id` on chat and gift events is optional; absent means the global
/// scope shared by every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Go live with a new session
    ProducerReady {
        title: String,
        #[serde(default)]
        codec: String,
        display_name: String,
    },

    /// End a session this connection produces
    ProducerStop { session_id: SessionId },

    /// Start listening to a session
    ConsumerJoin {
        session_id: SessionId,
        display_name: String,
    },

    /// Stop listening to a session
    ConsumerLeave { session_id: SessionId },

    /// Opaque negotiation message for another connection
    Signal {
        to: ConnectionId,
        payload: serde_json::Value,
    },

    /// Chat message
    ChatSend {
        #[serde(default)]
        session_id: Option<SessionId>,
        text: String,
    },

    /// Virtual gift
    GiftSend {
        #[serde(default)]
        session_id: Option<SessionId>,
        gift_id: String,
    },

    /// Ask for the current session list
    ListSessionsRequest,

    /// Ask for recent chat/gift history
    ChatHistoryRequest {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
}

impl ClientEvent {
    /// Decode an event from a JSON text frame
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_producer_ready() {
        let event = ClientEvent::from_json(
            r#"{"type":"producer-ready","title":"Evening show","codec":"audio/webm;codecs=opus","display_name":"dj"}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::ProducerReady {
                title: "Evening show".into(),
                codec: "audio/webm;codecs=opus".into(),
                display_name: "dj".into(),
            }
        );
    }

    #[test]
    fn test_decode_unit_variant() {
        let event = ClientEvent::from_json(r#"{"type":"list-sessions-request"}"#).unwrap();
        assert_eq!(event, ClientEvent::ListSessionsRequest);
    }

    #[test]
    fn test_decode_global_chat() {
        let event = ClientEvent::from_json(r#"{"type":"chat-send","text":"hello"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::ChatSend {
                session_id: None,
                text: "hello".into(),
            }
        );
    }

    #[test]
    fn test_decode_signal_keeps_payload_opaque() {
        let event = ClientEvent::from_json(
            r#"{"type":"signal","to":4,"payload":{"sdp":"v=0","kind":"offer"}}"#,
        )
        .unwrap();

        match event {
            ClientEvent::Signal { to, payload } => {
                assert_eq!(to, ConnectionId(4));
                assert_eq!(payload, json!({"sdp": "v=0", "kind": "offer"}));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_type() {
        assert!(ClientEvent::from_json(r#"{"type":"launch-rockets"}"#).is_err());
        assert!(ClientEvent::from_json("not json").is_err());
    }
}
