use super::packet::Packet;
use crate::{
    errors::{FrameError, RconError},
    socket::Transport,
};
use bytes::{Buf, BytesMut};
use std::{io, time::Duration};
use tokio::time::{timeout, Instant};

/// Turns the transport's byte stream into packets.
///
/// Bytes that do not form a whole packet yet are kept between calls.
#[derive(Debug)]
pub(crate) struct FrameReader {
    buffer: BytesMut,
    max_packet_size: usize,
}

impl FrameReader {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_packet_size,
        }
    }

    /// Whether part of a packet is waiting for the rest of its bytes.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Read the next packet, waiting at most `budget` for it to complete.
    ///
    /// With `quiet` set, gives up with `Ok(None)` if the stream stays silent
    /// for `quiet` (or whatever is left of `budget`, if less) while no partial
    /// packet is buffered. Silence with a partial packet buffered is a timeout.
    pub async fn next_packet<T>(
        &mut self,
        transport: &mut T,
        budget: Duration,
        quiet: Option<Duration>,
    ) -> Result<Option<Packet>, RconError>
    where
        T: Transport + ?Sized,
    {
        let deadline = Instant::now() + budget;

        loop {
            if let Some(packet) = Packet::decode_from(&mut self.buffer, self.max_packet_size)? {
                tracing::trace!(id = packet.id, packet_type = ?packet.packet_type, len = packet.body.len(), "frame");
                return Ok(Some(packet));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let (wait, quiet_wait) = match quiet {
                Some(window) if self.buffer.is_empty() => (window.min(remaining), true),
                _ => (remaining, false),
            };

            match timeout(wait, transport.receive(&mut self.buffer)).await {
                Ok(Ok(0)) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(Ok(_)) => {}
                Ok(Err(err)) => return Err(err.into()),
                Err(_) if quiet_wait => return Ok(None),
                Err(_) => return Err(RconError::Timeout(budget)),
            }
        }
    }

    /// Consume `marker`, a run of raw bytes that is not a packet, from the
    /// front of the stream.
    pub async fn expect_marker<T>(&mut self, transport: &mut T, marker: &[u8], budget: Duration) -> Result<(), RconError>
    where
        T: Transport + ?Sized,
    {
        let deadline = Instant::now() + budget;

        loop {
            let seen = self.buffer.len().min(marker.len());
            if self.buffer[..seen] != marker[..seen] {
                return Err(FrameError::MalformedMarker.into());
            }

            if seen == marker.len() {
                self.buffer.advance(seen);
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, transport.receive(&mut self.buffer)).await {
                Ok(Ok(0)) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(Ok(_)) => {}
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => return Err(RconError::Timeout(budget)),
            }
        }
    }
}
