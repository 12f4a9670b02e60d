//! Message-oriented wrapper around a TCP stream.
//!
//! [`Channel`] is a thin wrapper around `tokio::net::TcpStream` that speaks
//! whole protocol messages instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only byte I/O and message boundaries.
//!
//! # Message framing
//!
//! A byte stream does not preserve write boundaries, so every message is
//! prefixed with its body length:
//!
//! ```text
//! +---------------+---------------+---------------+---------------+
//! |                 Body Length (u32, big-endian)                 |
//! +---------------+---------------+---------------+---------------+
//! |                        Body ...                               |
//! +---------------+---------------+---------------+---------------+
//! ```
//!
//! Reads go through an internal buffer filled with `AsyncReadExt::read`, so a
//! receive that is cancelled by a timeout never loses bytes that were
//! already pulled off the socket.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Byte length of the length prefix.
pub const LEN_PREFIX: usize = 4;

/// Largest body the channel will accept.  Anything bigger is a protocol error.
pub const MAX_MESSAGE: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Underlying I/O error from the OS.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// No complete message arrived within the allotted time.
    #[error("timed out after {0:?} waiting for a message")]
    Timeout(Duration),
    /// The peer announced a body larger than [`MAX_MESSAGE`].
    #[error("peer announced a {0}-byte message, limit is {MAX_MESSAGE}")]
    Oversized(usize),
    /// The peer closed the stream in the middle of a message.
    #[error("stream closed with {0} byte(s) of an unfinished message")]
    Truncated(usize),
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A bidirectional, message-oriented connection to one peer.
#[derive(Debug)]
pub struct Channel {
    /// Address of the remote peer.
    pub peer: SocketAddr,
    stream: TcpStream,
    /// Bytes read from the socket that do not yet form a whole message.
    pending: Vec<u8>,
}

impl Channel {
    /// Wrap an already-connected stream.
    pub fn new(stream: TcpStream) -> Result<Self, ChannelError> {
        let peer = stream.peer_addr()?;
        // Frames are small and the protocol is latency bound.
        stream.set_nodelay(true)?;
        Ok(Self {
            peer,
            stream,
            pending: Vec::new(),
        })
    }

    /// Open a connection to `addr`.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream)
    }

    /// Send `body` as one message.
    pub async fn send(&mut self, body: &[u8]) -> Result<(), ChannelError> {
        if body.len() > MAX_MESSAGE {
            return Err(ChannelError::Oversized(body.len()));
        }
        let mut buf = Vec::with_capacity(LEN_PREFIX + body.len());
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between
    /// messages.  Blocks without limit otherwise.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        loop {
            if let Some(body) = self.take_message()? {
                return Ok(Some(body));
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return if self.pending.is_empty() {
                    Ok(None)
                } else {
                    Err(ChannelError::Truncated(self.pending.len()))
                };
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Like [`recv`](Self::recv), but gives up with [`ChannelError::Timeout`]
    /// after `limit`.  Partially received data is kept for the next call.
    pub async fn recv_timeout(&mut self, limit: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        match tokio::time::timeout(limit, self.recv()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ChannelError::Timeout(limit)),
        }
    }

    /// Close the write half; the peer sees end-of-stream after draining.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Pop one complete message off the front of `pending`, if present.
    fn take_message(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        if self.pending.len() < LEN_PREFIX {
            return Ok(None);
        }
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&self.pending[..LEN_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_MESSAGE {
            return Err(ChannelError::Oversized(len));
        }
        if self.pending.len() < LEN_PREFIX + len {
            return Ok(None);
        }
        let body = self.pending[LEN_PREFIX..LEN_PREFIX + len].to_vec();
        self.pending.drain(..LEN_PREFIX + len);
        Ok(Some(body))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
