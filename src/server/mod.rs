//! WebSocket server
//!
//! Accepts TCP connections, upgrades them to WebSocket and drives one
//! [`RelayHub`](crate::hub::RelayHub) connection per socket. Text frames carry
//! JSON control events; binary frames carry media chunks.

pub mod config;
pub mod listener;
pub mod peer;

pub use config::ServerConfig;
pub use listener::RelayServer;
