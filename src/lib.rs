//! Live audio session relay
//!
//! Fans out binary media chunks from one producer connection to many consumer
//! connections, keeps listener counts and chat/gift activity in sync across
//! clients, and relays opaque signaling messages so a producer and a consumer
//! can negotiate a direct media path.
//!
//! # Architecture
//!
//! ```text
//!                              RelayHub
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ ConnectionRegistry   SessionTable            Notifier        │
//!   │  id -> Connection     id -> Mutex<Entry {     broadcast_all  │
//!   │   role, session,        producer,             broadcast_sess │
//!   │   outbound queue        init_chunk,           chat history   │
//!   │                         listeners }                          │
//!   │                                                              │
//!   │ ChunkRelay           Presence                SignalingRelay  │
//!   │  submit_chunk         join / leave            relay(from,to) │
//!   │  on_consumer_join     on_disconnect                          │
//!   └──────────────────────────────────────────────────────────────┘
//!          ▲ ClientEvent / binary chunk          │ Outbound
//!          │                                     ▼
//!     [server::peer read loop]          [server::peer write loop] ──► WebSocket
//! ```
//!
//! Every mutation of a session happens under that session's mutex, and all
//! deliveries are non-blocking `try_send`s into bounded per-connection queues,
//! so a slow consumer only ever loses its own chunks.
//!
//! # Example
//!
//! ```no_run
//! use liverelay::{RelayServer, ServerConfig};
//!
//! # async fn example() -> liverelay::Result<()> {
//! let server = RelayServer::new(ServerConfig::default());
//! server.run().await
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod hub;
pub mod notify;
pub mod presence;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod signaling;
pub mod stats;

pub use connection::{ConnectionId, ConnectionRegistry, Outbound};
pub use error::{Error, ErrorKind, RelayError, Result};
pub use hub::RelayHub;
pub use protocol::{ClientEvent, ServerEvent};
pub use server::{RelayServer, ServerConfig};
pub use session::{RelayConfig, SessionId, SessionTable};
