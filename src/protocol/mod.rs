//! Wire protocol
//!
//! Control events are JSON objects tagged by a kebab-case `"type"` field and
//! travel as WebSocket text frames. Media chunks travel as binary frames: a
//! binary frame from a producer is a chunk for the session it produces, and a
//! binary frame sent to a consumer is a delivered chunk.

pub mod client;
pub mod server;

pub use client::ClientEvent;
pub use server::{EndReason, ServerEvent};
