//! Wire format encoding and decoding.
//!
//! Implements the 32-byte header format:
//! ```text
//! ┌────────┬─────────┬──────┬─────┬────────────┬─────────────┬──────────┬───────────┐
//! │ Magic  │ Version │ Type │ Pad │ Message ID │ Body length │ Checksum │ Timestamp │
//! │ 4 B    │ 4 B     │ 1 B  │ 3 B │ 4 B        │ 4 B         │ 4 B      │ 8 B       │
//! └────────┴─────────┴──────┴─────┴────────────┴─────────────┴──────────┴───────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. The three pad bytes are
//! written as zero and ignored on read, so both peers always agree on the
//! 32-byte header size.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, RpcError};
use crate::message::MessageType;

/// Protocol magic constant.
pub const MAGIC: u32 = 0x1234_5678;

/// Current protocol version.
pub const VERSION: u32 = 1;

/// Header size in bytes (fixed, exactly 32).
pub const HEADER_SIZE: usize = 32;

/// Default maximum body size (64 MiB).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

/// Byte offset of the `body_length` field, used by the framer to size a
/// frame before the header is fully validated.
pub(crate) const BODY_LENGTH_OFFSET: usize = 16;

/// Rolling hash over the body bytes: `h ← h*31 + b`, wrapping mod 2³².
pub fn checksum(body: &[u8]) -> u32 {
    body.iter()
        .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

/// Seconds since the Unix epoch; advisory only.
fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Magic constant (0x12345678).
    pub magic: u32,
    /// Protocol version (currently 1).
    pub version: u32,
    /// Message type discriminant.
    pub msg_type: MessageType,
    /// Per-connection correlation token; 0 for notifications.
    pub message_id: u32,
    /// Byte length of the JSON body that follows.
    pub body_length: u32,
    /// Rolling checksum of the body.
    pub checksum: u32,
    /// Send time, seconds since the Unix epoch; advisory.
    pub timestamp: u64,
}

impl FrameHeader {
    /// Create a header for the given body, stamping checksum and the
    /// current wall-clock time.
    pub fn new(msg_type: MessageType, message_id: u32, body: &[u8]) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            msg_type,
            message_id,
            body_length: body.len() as u32,
            checksum: checksum(body),
            timestamp: unix_timestamp(),
        }
    }

    /// Encode the header to its 32-byte wire form (Little Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than `HEADER_SIZE` (32 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8] = self.msg_type.as_u8();
        buf[9..12].fill(0);
        buf[12..16].copy_from_slice(&self.message_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.body_length.to_le_bytes());
        buf[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf[24..32].copy_from_slice(&self.timestamp.to_le_bytes());
    }

    /// Decode a header from bytes (Little Endian).
    ///
    /// Fails with [`RpcError::Truncated`] when fewer than 32 bytes are
    /// present and [`RpcError::UnknownMessageType`] for a type byte
    /// outside the taxonomy. The magic is *not* checked here; frame
    /// validation owns that decision.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(RpcError::Truncated(buf.len()));
        }
        let type_byte = buf[8];
        let msg_type =
            MessageType::from_u8(type_byte).ok_or(RpcError::UnknownMessageType(type_byte))?;
        Ok(Self {
            magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            version: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            msg_type,
            message_id: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            body_length: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            checksum: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            timestamp: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
        })
    }

    /// Read only the `body_length` field, for framing. Returns `None`
    /// when fewer than `HEADER_SIZE` bytes are available.
    pub(crate) fn peek_body_length(buf: &[u8]) -> Option<u32> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(u32::from_le_bytes(
            buf[BODY_LENGTH_OFFSET..BODY_LENGTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        ))
    }
}
