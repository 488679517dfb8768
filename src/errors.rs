//! All the errors defined by this crate.

use crate::rcon::ConnectionState;
use std::{
    io::{self, ErrorKind},
    time::Duration,
};
use thiserror::Error;

/// Malformed or out-of-protocol data recieved from the server.
///
/// Once one of these is seen the byte stream can no longer be trusted to be
/// aligned on frame boundaries, so the connection is faulted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The size field lies outside of `[10, max]`.
    #[error("declared packet size {size} outside of allowed range (max {max})")]
    SizeOutOfRange {
        /// Size as declared by the packet.
        size: i32,
        /// Configured maximum.
        max: usize,
    },

    /// The two NUL bytes closing the packet were not where the size said.
    #[error("packet terminator missing")]
    MissingTerminator,

    /// Packet type that has no meaning at this point of the conversation.
    #[error("unexpected packet type {0}")]
    UnexpectedPacketType(i32),

    /// Mismatch with the pending request ID.
    ///
    /// Note: the server replies with a request ID of -1 in the case of an
    /// authentication failure. In that case, [`RconError::AuthFailed`] is
    /// returned instead.
    #[error("request id mismatch: expected {expected:?}, got {got}")]
    RequestIdMismatch {
        /// ID of the pending request, if any.
        expected: Option<i32>,
        /// ID carried by the packet.
        got: i32,
    },

    /// The end-of-response marker of the Squad dialect was corrupt.
    #[error("malformed end-of-response marker")]
    MalformedMarker,
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        io::Error::new(ErrorKind::InvalidData, err)
    }
}

/// An error from the RCON protocol.
#[derive(Error, Debug)]
pub enum RconError {
    /// The transport is broken. Requires a reconnect.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// No complete packet arrived within the timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// See [`FrameError`].
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Authentication failed. You probably entered the wrong RCON password.
    #[error("authentication failed")]
    AuthFailed,

    /// A previous `execute` was abandoned before its response completed.
    #[error("a request is already pending on this connection")]
    RequestPending,

    /// The operation is not valid in the current connection state.
    #[error("operation not valid while connection is {0}")]
    InvalidState(ConnectionState),

    /// Payload too long. The size field of outgoing packets may not exceed 4096.
    #[error("payload too long")]
    PayloadTooLong,
}

impl RconError {
    /// Whether this error leaves the connection faulted.
    ///
    /// Only caller mistakes (oversized payloads, calls in the wrong state)
    /// leave the connection usable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PayloadTooLong | Self::InvalidState(_))
    }
}

impl From<RconError> for io::Error {
    fn from(err: RconError) -> Self {
        match err {
            RconError::Connection(err) => err,
            RconError::Timeout(_) => io::Error::new(ErrorKind::TimedOut, err),
            RconError::AuthFailed => io::Error::new(ErrorKind::PermissionDenied, err),
            RconError::Frame(frame) => frame.into(),
            RconError::RequestPending | RconError::InvalidState(_) => {
                io::Error::new(ErrorKind::Other, err)
            }
            RconError::PayloadTooLong => io::Error::new(ErrorKind::InvalidInput, err),
        }
    }
}
