//! Connection adapter: frame-oriented reading and writing on a stream.
//!
//! [`FrameReader`] binds a read half to a [`FrameBuffer`] and hands out
//! one complete frame per await; [`write_frame`] pushes a fully encoded
//! frame to the peer. Everything above this module works in whole frames.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::protocol::FrameBuffer;

/// Read-buffer size for each socket read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Readable-event source yielding complete frames from a byte stream.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    ready: Vec<Bytes>,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a read half with the default body-size limit.
    pub fn new(reader: R) -> Self {
        Self::with_buffer(reader, FrameBuffer::new())
    }

    /// Wrap a read half with a pre-configured frame buffer.
    pub fn with_buffer(reader: R, buffer: FrameBuffer) -> Self {
        Self {
            reader,
            buffer,
            ready: Vec::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Await the next complete frame.
    ///
    /// Returns `Ok(None)` on clean end-of-stream. I/O errors and framing
    /// loss (oversized body length) propagate as errors; both mean the
    /// connection is done.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if !self.ready.is_empty() {
                return Ok(Some(self.ready.remove(0)));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.ready = self.buffer.push(&self.chunk[..n])?;
        }
    }
}

/// Write a complete encoded frame and flush it to the OS.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
