//! Remote command execution over RCON, including Squad's chat stream.
//! See the documentation for [`RconClient`] for more information.

pub mod chat;
mod client;
pub mod packet;
mod reader;
pub mod reassembly;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;

pub use chat::ChatBuffer;
pub use client::RconClient;
pub use packet::{Packet, PacketType, SQUAD_CHAT};

/// Largest body the server puts in a single response packet.
pub const MAX_LEN_CLIENTBOUND: usize = 4096;

/// Largest size field the client may send.
pub const MAX_LEN_SERVERBOUND: usize = 4096;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Closed by the caller.
    Disconnected,
    /// Transport open, not authenticated.
    Connected,
    /// Waiting for the answer to the password.
    Authenticating,
    /// Authenticated and idle.
    Ready,
    /// A fatal error occurred. The connection must be closed and reopened.
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Faulted => "faulted",
        };

        f.write_str(name)
    }
}
