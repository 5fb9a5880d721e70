//! Session table
//!
//! A session is one producer's live broadcast. The table maps session ids to
//! entries guarded by a per-session mutex; every mutation of one session
//! (listener set, cached initialization chunk, stats) is serialized by that
//! mutex while different sessions never contend.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<RwLock<SessionMap>>
//!                  ┌───────────────────────────────┐
//!                  │ SessionId -> Arc<Mutex<        │
//!                  │   SessionEntry {               │
//!                  │     producer, producer_tx,     │
//!                  │     init_chunk: Option<Bytes>, │
//!                  │     listeners: {id -> tx},     │
//!                  │   }>                           │
//!                  └───────────────┬───────────────┘
//!                                  │
//!          ┌───────────────────────┼───────────────────────┐
//!          ▼                       ▼                       ▼
//!     [ChunkRelay]            [Presence]              [Notifier]
//!     submit_chunk()          join()/leave()          broadcast_session()
//! ```
//!
//! # Zero-Copy Design
//!
//! Chunks are `bytes::Bytes`; the cached initialization chunk and every
//! per-listener delivery share one reference-counted allocation.

pub mod config;
pub mod entry;
pub mod id;
pub mod table;

pub use config::RelayConfig;
pub use entry::{
    Listener, SessionEntry, SessionMetadata, SessionSnapshot, SessionState, SessionSummary,
};
pub use id::SessionId;
pub use table::SessionTable;
