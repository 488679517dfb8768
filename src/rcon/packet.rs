//! Encoding and decoding of single RCON packets.

use crate::errors::FrameError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::mem::size_of;

/// Size of the `size` field that prefixes every packet.
const SIZE_FIELD: usize = size_of::<i32>();

/// Smallest legal value of the size field: id, type and the two NUL bytes.
pub(crate) const MIN_SIZE: usize = size_of::<i32>() * 2 + 2;

/// Type code the Squad server uses for its unsolicited chat stream.
pub const SQUAD_CHAT: i32 = 1;

/// The type field of a packet.
///
/// Code `2` means `SERVERDATA_EXECCOMMAND` when sent by the client and
/// `SERVERDATA_AUTH_RESPONSE` when sent by the server, so both are the same
/// variant here. Codes outside of the baseline protocol are kept as
/// [`PacketType::Extension`] and interpreted by the active dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// `SERVERDATA_RESPONSE_VALUE`
    ResponseValue,
    /// `SERVERDATA_EXECCOMMAND`
    ExecCommand,
    /// `SERVERDATA_AUTH`
    Auth,
    /// Dialect specific code, e.g. [`SQUAD_CHAT`].
    Extension(i32),
}

impl PacketType {
    /// `SERVERDATA_AUTH_RESPONSE`, which shares its code with `SERVERDATA_EXECCOMMAND`.
    pub const AUTH_RESPONSE: Self = Self::ExecCommand;
}

impl From<PacketType> for i32 {
    fn from(packet_type: PacketType) -> Self {
        match packet_type {
            PacketType::ResponseValue => 0,
            PacketType::ExecCommand => 2,
            PacketType::Auth => 3,
            PacketType::Extension(code) => code,
        }
    }
}

impl From<i32> for PacketType {
    fn from(value: i32) -> Self {
        match value {
            0 => PacketType::ResponseValue,
            2 => PacketType::ExecCommand,
            3 => PacketType::Auth,
            code => PacketType::Extension(code),
        }
    }
}

/// One frame of the RCON wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Correlates a command with its response.
    pub id: i32,
    /// See [`PacketType`].
    pub packet_type: PacketType,
    /// Payload, without its NUL terminator.
    pub body: Bytes,
}

impl Packet {
    /// Construct a packet.
    pub fn new(id: i32, packet_type: PacketType, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            packet_type,
            body: body.into(),
        }
    }

    /// Value of the size field for this packet.
    #[must_use]
    pub fn size(&self) -> usize {
        get_remaining_length(self.body.len())
    }

    /// Encode the packet into its wire representation.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(SIZE_FIELD + self.size());

        bytes.put_i32_le(self.size() as i32);
        bytes.put_i32_le(self.id);
        bytes.put_i32_le(self.packet_type.into());
        bytes.put(self.body.clone());
        bytes.put_u16(0x00_00);

        bytes.freeze()
    }

    /// Decode exactly one packet from `bytes`.
    ///
    /// # Errors
    /// Returns [`FrameError::SizeOutOfRange`] if the declared size is smaller
    /// than the fixed fields or larger than `max_size`, and
    /// [`FrameError::MissingTerminator`] if fewer bytes than declared are
    /// present or the packet is not closed by two NUL bytes.
    pub fn decode(bytes: &[u8], max_size: usize) -> Result<Self, FrameError> {
        let mut buffer = BytesMut::from(bytes);

        match Self::decode_from(&mut buffer, max_size)? {
            Some(packet) => Ok(packet),
            None => Err(FrameError::MissingTerminator),
        }
    }

    /// Decode the packet at the front of `buffer`, consuming its bytes.
    ///
    /// Returns `Ok(None)` if the buffer does not yet hold a whole packet.
    /// The size field is checked as soon as it is available, so a corrupt
    /// length is reported before waiting for (or allocating) the body.
    ///
    /// # Errors
    /// See [`Packet::decode`].
    pub fn decode_from(buffer: &mut BytesMut, max_size: usize) -> Result<Option<Self>, FrameError> {
        if buffer.len() < SIZE_FIELD {
            return Ok(None);
        }

        let size = i32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        let len = usize::try_from(size).unwrap_or(0);

        if len < MIN_SIZE || len > max_size {
            return Err(FrameError::SizeOutOfRange {
                size,
                max: max_size,
            });
        }

        if buffer.len() < SIZE_FIELD + len {
            return Ok(None);
        }

        if buffer[SIZE_FIELD + len - 2..SIZE_FIELD + len] != [0, 0] {
            return Err(FrameError::MissingTerminator);
        }

        let mut frame = buffer.split_to(SIZE_FIELD + len);
        frame.advance(SIZE_FIELD);

        let id = frame.get_i32_le();
        let packet_type = frame.get_i32_le().into();
        frame.truncate(frame.len() - 2);

        Ok(Some(Self {
            id,
            packet_type,
            body: frame.freeze(),
        }))
    }
}

/// Get the *remaining length* of a packet given the length of its body.
///
/// Remaining length refers to the length of the packet in bytes excluding
/// the four bytes of the size field itself: two [i32]s (id and type), the
/// body, and **TWO** 0 bytes.
fn get_remaining_length(body_len: usize) -> usize {
    body_len + MIN_SIZE
}
