//! Newline framing over an async byte stream (§4.1).
//!
//! A frame is the bytes up to (not including) a single `\n`. Reading is
//! bounded: we never buffer more than `max_frame_bytes + 1` bytes looking
//! for a delimiter that isn't there.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::FrameError;

pub struct FrameReader<R> {
    reader: BufReader<R>,
    max_frame_bytes: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self { reader: BufReader::new(reader), max_frame_bytes }
    }

    /// Blocks until one full frame is available, or fails per §4.1.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, FrameError> {
        let mut frame = Vec::new();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Err(FrameError::Eof);
            }
            if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                frame.extend_from_slice(&available[..pos]);
                self.reader.consume(pos + 1);
                if frame.len() > self.max_frame_bytes {
                    return Err(FrameError::FrameTooLarge);
                }
                return Ok(frame);
            }
            frame.extend_from_slice(available);
            let consumed = available.len();
            self.reader.consume(consumed);
            if frame.len() > self.max_frame_bytes {
                return Err(FrameError::FrameTooLarge);
            }
        }
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes `payload` then `\n`, then flushes.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        self.writer.write_all(payload).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
