//! Real-time chat core: a registry of live peer sessions and best-effort
//! fan-out of each inbound frame to every other peer.

pub mod broadcast;
pub mod error;
pub mod handler;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use broadcast::{BroadcastReport, Delivery, Dispatcher, DropReason};
pub use error::ChatError;
pub use handler::attach;
pub use registry::ConnectionRegistry;
pub use session::{CloseReason, PeerSession, SessionState, SessionTask};
pub use transport::{FrameSink, FrameSource};
