//! Client-side mirror of the server's newline framing (§4.1). Duplicated
//! rather than shared because it's the only I/O this crate does and pulling
//! in the server crate for one function would invert the dependency graph.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

const MAX_FRAME_BYTES: usize = 65536;

pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader: BufReader::new(reader) }
    }

    /// `Ok(None)` on clean EOF, matching a socket the server closed.
    pub async fn read_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut frame = Vec::new();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(None);
            }
            if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                frame.extend_from_slice(&available[..pos]);
                self.reader.consume(pos + 1);
                return Ok(Some(frame));
            }
            frame.extend_from_slice(available);
            let consumed = available.len();
            self.reader.consume(consumed);
            if frame.len() > MAX_FRAME_BYTES {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "frame exceeds size cap"));
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

    pub async fn write_frame(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(payload).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}
