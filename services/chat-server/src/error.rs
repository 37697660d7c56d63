//! Per-layer error types (§4.8). Narrow enums, not a single catch-all —
//! each layer converts the one below it with `#[from]` only where that
//! lower error is a strict subset of its own.

/// Framing-layer failures (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame exceeds the configured size cap")]
    FrameTooLarge,
    #[error("connection closed")]
    Eof,
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures handing a frame to the writer side of a connection (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue is full")]
    Backpressure,
    #[error("connection is closing")]
    Closed,
}
