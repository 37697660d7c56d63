//! Per-connection reader/writer tasks and the handle the hub uses to talk
//! back to them (§4.3).

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{FrameError, SendError};
use crate::framing::{FrameReader, FrameWriter};
use crate::hub::{InboundMsg, RegisterMsg, UnregisterMsg};

/// Stable per-connection identifier (§3). Derived from the socket's local
/// and peer addresses plus a monotonic sequence number so that a client
/// reconnecting from the same `(local, peer)` pair never collides with a
/// connection the hub hasn't finished tearing down yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    local: SocketAddr,
    peer: SocketAddr,
    seq: u64,
}

impl ConnectionId {
    fn next(local: SocketAddr, peer: SocketAddr) -> Self {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        Self { local, peer, seq: SEQ.fetch_add(1, Ordering::Relaxed) }
    }
}

/// Builds a [`ConnectionHandle`] backed by a plain channel, with no real
/// socket behind it, so the hub's dispatch logic can be unit-tested without
/// a `TcpListener` (§4.9).
#[cfg(test)]
pub(crate) fn test_handle(seq: u64) -> (ConnectionHandle, mpsc::Receiver<Vec<u8>>) {
    let local: SocketAddr = "127.0.0.1:1".parse().unwrap();
    let peer: SocketAddr = format!("127.0.0.1:{}", 2000 + seq).parse().unwrap();
    let id = ConnectionId { local, peer, seq };
    let (tx, rx) = mpsc::channel(128);
    (ConnectionHandle { id, tx, cancel: CancellationToken::new() }, rx)
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.peer, self.seq)
    }
}

/// What the hub holds to reach a connection. Cheap to clone; the actual
/// queue and cancellation state are shared via `Arc`-backed tokio types.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Non-blocking enqueue (§4.3). Never waits; a full queue is the
    /// caller's signal to treat this client as fail-closed.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SendError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Idempotent: cancelling an already-cancelled token is a no-op.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

pub struct ConnectionConfig {
    pub max_frame_bytes: usize,
    pub write_queue_depth: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

/// Runs one accepted connection to completion: registers with the hub,
/// spawns reader and writer tasks, and blocks until both exit (§4.3).
pub async fn run(
    stream: TcpStream,
    shutdown: CancellationToken,
    config: ConnectionConfig,
    register_tx: mpsc::Sender<RegisterMsg>,
    unregister_tx: mpsc::Sender<UnregisterMsg>,
    inbound_tx: mpsc::Sender<InboundMsg>,
) {
    let local = match stream.local_addr() {
        Ok(addr) => addr,
        Err(_) => return,
    };
    let peer = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(_) => return,
    };
    let id = ConnectionId::next(local, peer);
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    let (tx, rx) = mpsc::channel(config.write_queue_depth);
    let cancel = shutdown.child_token();
    let handle = ConnectionHandle { id, tx, cancel: cancel.clone() };

    if register_tx.send(RegisterMsg { id, handle }).await.is_err() {
        return; // hub is gone; nothing left to do
    }

    let reader = tokio::spawn(run_reader(
        id,
        read_half,
        config.max_frame_bytes,
        config.read_timeout,
        cancel.clone(),
        inbound_tx,
        unregister_tx.clone(),
    ));
    let writer = tokio::spawn(run_writer(id, write_half, config.write_timeout, cancel, rx, unregister_tx));

    let _ = tokio::join!(reader, writer);
}

async fn run_reader<R: AsyncRead + Unpin + Send + 'static>(
    id: ConnectionId,
    read_half: R,
    max_frame_bytes: usize,
    read_timeout: Option<Duration>,
    cancel: CancellationToken,
    inbound_tx: mpsc::Sender<InboundMsg>,
    unregister_tx: mpsc::Sender<UnregisterMsg>,
) {
    let mut reader = FrameReader::new(read_half, max_frame_bytes);
    let reason = loop {
        let read = read_with_deadline(&mut reader, read_timeout);
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break "cancelled".to_owned(),
            result = read => result,
        };
        match frame {
            Ok(frame) => {
                if inbound_tx.send(InboundMsg { id, frame }).await.is_err() {
                    break "hub gone".to_owned();
                }
            }
            Err(err) => break err.to_string(),
        }
    };
    let _ = unregister_tx.send(UnregisterMsg { id, reason }).await;
}

async fn read_with_deadline<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    deadline: Option<Duration>,
) -> Result<Vec<u8>, FrameError> {
    match deadline {
        None => reader.read_frame().await,
        Some(d) => match tokio::time::timeout(d, reader.read_frame()).await {
            Ok(result) => result,
            Err(_) => Err(FrameError::Eof),
        },
    }
}

async fn run_writer<W: AsyncWrite + Unpin + Send + 'static>(
    id: ConnectionId,
    write_half: W,
    write_timeout: Option<Duration>,
    cancel: CancellationToken,
    mut rx: mpsc::Receiver<Vec<u8>>,
    unregister_tx: mpsc::Sender<UnregisterMsg>,
) {
    let mut writer = FrameWriter::new(write_half);
    let reason = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break "cancelled".to_owned(),
            next = rx.recv() => next,
        };
        let Some(frame) = next else { break "queue closed".to_owned() };
        let outcome = match write_timeout {
            None => writer.write_frame(&frame).await,
            Some(d) => match tokio::time::timeout(d, writer.write_frame(&frame)).await {
                Ok(result) => result,
                Err(_) => Err(FrameError::Eof),
            },
        };
        if let Err(err) = outcome {
            break err.to_string();
        }
    };
    let _ = unregister_tx.send(UnregisterMsg { id, reason }).await;
}
