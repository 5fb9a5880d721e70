//! Connection registry
//!
//! Every live transport connection gets a `ConnectionId` and an entry in the
//! `ConnectionRegistry`. The entry records the connection's role (producer,
//! consumer or unbound), which session it is bound to, and the sending half of
//! its bounded outbound queue. Session components refer to connections only by
//! id and clone the outbound sender when they need to deliver to one.

pub mod outbound;
pub mod registry;
pub mod state;

pub use outbound::{outbound_channel, Delivery, Outbound, OutboundSender, CONTROL_RESERVE};
pub use registry::ConnectionRegistry;
pub use state::{Connection, ConnectionId, MembershipPhase, Role};
