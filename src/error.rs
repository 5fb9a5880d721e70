//! Error types
//!
//! `RelayError` covers everything a client can get wrong against the relay
//! state (unknown ids, missing role, full session). `Error` is the transport
//! level error returned by the server and per-connection tasks.

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite;

use crate::connection::ConnectionId;
use crate::session::SessionId;

/// Result alias for transport-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,
}

/// Error category reported back to clients in `error` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Unknown session or connection
    NotFound,
    /// Connection lacks the role or binding the operation requires
    Unauthorized,
    /// Session listener cap reached
    Capacity,
    /// Inbound message could not be decoded
    InvalidMessage,
}

/// Error type for relay operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Session does not exist or has already been destroyed
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Connection is not registered
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Connection is already the producer of a live session
    #[error("connection {0} is already producing a session")]
    AlreadyProducing(ConnectionId),

    /// Connection attempted an operation its role does not allow
    #[error("connection {conn} may not {action}")]
    Unauthorized {
        conn: ConnectionId,
        action: &'static str,
    },

    /// Session has reached its configured listener cap
    #[error("session {session} is full ({capacity} listeners)")]
    SessionFull { session: SessionId, capacity: usize },
}

impl RelayError {
    /// Category used when reporting the error to the originating connection
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::SessionNotFound(_) | RelayError::ConnectionNotFound(_) => {
                ErrorKind::NotFound
            }
            RelayError::AlreadyProducing(_) | RelayError::Unauthorized { .. } => {
                ErrorKind::Unauthorized
            }
            RelayError::SessionFull { .. } => ErrorKind::Capacity,
        }
    }
}
