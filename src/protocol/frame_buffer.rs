//! Frame buffer for accumulating partial reads.
//!
//! Sockets deliver bytes in arbitrary chunks: a read may carry half a
//! header, three frames and a tail, or a single byte. The buffer
//! accumulates everything and yields only complete `[header][body]`
//! frames; partial headers and partial bodies are never parsed.
//!
//! Framing trusts exactly one header field, `body_length`, so a frame
//! whose magic or checksum later fails validation does not desynchronize
//! the stream; the next frame boundary is still known.
//!
//! # Example
//!
//! ```ignore
//! let mut buffer = FrameBuffer::new();
//! let frames = buffer.push(&chunk)?;
//! for frame in frames {
//!     let message = JsonCodec::decode(&frame)?;
//! }
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{FrameHeader, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE};
use crate::error::{Result, RpcError};

/// Buffer that reassembles complete frames from fragmented reads.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Maximum allowed body size.
    max_body_size: u32,
}

impl FrameBuffer {
    /// Create a frame buffer with the default body-size limit.
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_SIZE)
    }

    /// Create a frame buffer with a custom body-size limit.
    pub fn with_max_body(max_body_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            max_body_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns each complete frame as a contiguous `[header][body]`
    /// buffer, ready for [`JsonCodec::decode`](crate::codec::JsonCodec).
    /// Fragmented remainders stay buffered for the next push.
    ///
    /// # Errors
    ///
    /// [`RpcError::BodyTooLarge`] when a header claims a body beyond the
    /// configured limit. At that point framing is lost; the caller should
    /// drop the connection.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        let Some(body_length) = FrameHeader::peek_body_length(&self.buffer) else {
            return Ok(None);
        };

        if body_length > self.max_body_size {
            return Err(RpcError::BodyTooLarge(body_length, self.max_body_size));
        }

        let total = HEADER_SIZE + body_length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        Ok(Some(self.buffer.split_to(total).freeze()))
    }

    /// Number of buffered bytes not yet forming a complete frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
