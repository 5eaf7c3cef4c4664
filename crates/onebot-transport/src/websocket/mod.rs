//! WebSocket transports.
//!
//! This module provides the WebSocket server (consumers connect to us) and
//! the reverse WebSocket client (we connect to the consumer).

mod peer;

#[cfg(feature = "ws-server")]
mod server;
#[cfg(feature = "ws-server")]
pub use server::WsComm;

#[cfg(feature = "ws-reverse")]
mod reverse;
#[cfg(feature = "ws-reverse")]
pub use reverse::WsReverseComm;
