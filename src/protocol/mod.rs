//! Wire protocol: pinned header layout and stream framing.
//!
//! A frame is a fixed 32-byte header followed by `body_length` bytes of
//! JSON body. Frames abut on the stream with no delimiter; the
//! [`FrameBuffer`] reassembles them from arbitrarily fragmented reads.

mod frame_buffer;
mod wire_format;

pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    checksum, FrameHeader, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE, MAGIC, VERSION,
};
