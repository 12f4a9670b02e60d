//! Client transfer driver.
//!
//! Runs the sending side of one connection as a single sequential flow:
//!
//! ```text
//!  connect ─▶ handshake ─▶ negotiate ─▶ ┌─ send window burst ◀──────────┐
//!                                        │  read one ack (bounded)       │
//!                                        │   ├─ ack     → slide / resize ┤
//!                                        │   ├─ garbage → warn           ┤
//!                                        │   └─ timeout → rewind to base ┘
//!                                        └─ base == total ─▶ DONE ─▶ close
//! ```
//!
//! Timeouts retry forever with no back-off; only a transport error or the
//! peer closing the connection aborts the transfer.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::channel::{Channel, ChannelError};
use crate::config::{ClientConfig, ConfigError};
use crate::frame::{self, Ack};
use crate::gbn_sender::{GbnSender, SizeDirective};
use crate::handshake::{self, HandshakeError};
use crate::negotiation::{self, NegotiationError};
use crate::state::SessionState;

/// Fatal transfer failures.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot resolve {0}")]
    Resolve(String),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("peer closed the connection with {unacked} chunk(s) unacknowledged")]
    PeerClosed { unacked: usize },
}

/// Summary of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Size announced by the server during negotiation.
    pub negotiated_size: usize,
    /// Final chunk count (changes when a resize re-splits the tail).
    pub chunks: usize,
    /// Data frames written, first copies and retransmissions together.
    pub frames_sent: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub resizes: u64,
    pub final_size: SizeDirective,
}

/// The sending side of one connection.
pub struct Client {
    channel: Channel,
    state: SessionState,
    window_size: usize,
    timeout: Duration,
    dynamic: bool,
    requested_size: usize,
}

/// Load the configured message and send it to the configured server.
pub async fn run(config: &ClientConfig) -> Result<TransferReport, TransferError> {
    let blob = config.load_message()?;
    Client::connect(config).await?.send(&blob).await
}

impl Client {
    /// Wrap an already-connected channel.
    pub fn new(channel: Channel, config: &ClientConfig) -> Self {
        Self {
            channel,
            state: SessionState::Connected,
            window_size: config.window_size,
            timeout: config.timeout,
            dynamic: config.dynamic_message_size,
            requested_size: config.maximum_msg_size,
        }
    }

    /// Resolve `server_ip:server_port` and connect.
    pub async fn connect(config: &ClientConfig) -> Result<Self, TransferError> {
        let target = format!("{}:{}", config.server_ip, config.server_port);
        let addr: SocketAddr = tokio::net::lookup_host(&target)
            .await
            .map_err(|_| TransferError::Resolve(target.clone()))?
            .next()
            .ok_or_else(|| TransferError::Resolve(target.clone()))?;
        log::info!("[client] connecting to {addr}");
        let channel = Channel::connect(addr).await?;
        Ok(Self::new(channel, config))
    }

    /// Handshake, negotiate, and stream `blob` to the server.
    pub async fn send(mut self, blob: &[u8]) -> Result<TransferReport, TransferError> {
        match self.drive(blob).await {
            Ok(report) => {
                self.set_state(SessionState::Closed);
                Ok(report)
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                log::warn!("[client] transfer aborted: {e}");
                Err(e)
            }
        }
    }

    async fn drive(&mut self, blob: &[u8]) -> Result<TransferReport, TransferError> {
        handshake::initiate(&mut self.channel, self.timeout).await?;
        self.set_state(SessionState::Handshaken);

        let negotiated_size = negotiation::request_max_size(&mut self.channel, self.timeout).await?;
        if negotiated_size != self.requested_size {
            log::info!(
                "[client] server chose {negotiated_size} byte(s) instead of the requested {}",
                self.requested_size
            );
        }
        self.set_state(SessionState::Transferring);

        let mut sender = GbnSender::new(blob, negotiated_size, self.window_size);
        log::info!(
            "[client] sending {} byte(s) as {} chunk(s), window {}",
            blob.len(),
            sender.total_chunks(),
            self.window_size
        );

        let mut frames_sent = 0u64;
        let mut timeouts = 0u64;
        let mut resizes = 0u64;

        while !sender.is_complete() {
            while let Some(frame) = sender.next_frame() {
                self.channel.send(&frame.encode()).await?;
                frames_sent += 1;
                log::debug!(
                    "[gbn] → DATA seq={} len={} in_flight={}",
                    frame.seq,
                    frame.payload.len(),
                    sender.in_flight()
                );
            }

            let body = match self.channel.recv_timeout(self.timeout).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    return Err(TransferError::PeerClosed {
                        unacked: sender.total_chunks() - sender.base,
                    })
                }
                Err(ChannelError::Timeout(_)) => {
                    timeouts += 1;
                    let rewound = sender.on_timeout();
                    log::warn!(
                        "[gbn] timeout; going back to {} and resending {rewound} chunk(s)",
                        sender.base
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let ack = match Ack::parse(&body) {
                Ok(ack) => ack,
                Err(e) => {
                    log::warn!("[gbn] ignoring malformed ack: {e}");
                    continue;
                }
            };
            let outcome = sender.on_ack(&ack, self.dynamic);
            if let Some(size) = outcome.resized {
                resizes += 1;
                log::debug!(
                    "[gbn] adopting size {size} (v{}); {} chunk(s) total",
                    sender.size().version,
                    sender.total_chunks()
                );
            }
            if outcome.directive_ignored {
                log::debug!("[gbn] size directive ignored (dynamic sizing off)");
            }
            if outcome.acked > 0 {
                log::debug!(
                    "[gbn] ← ACK {:?} slid={} base={}",
                    ack.cumulative,
                    outcome.acked,
                    sender.base
                );
            }
        }

        let total = sender.total_chunks();
        self.channel.send(&frame::encode_done(total as u64)).await?;
        self.channel.shutdown().await?;
        self.drain_until_closed().await;

        let report = TransferReport {
            negotiated_size,
            chunks: total,
            frames_sent,
            retransmissions: sender.retransmissions(),
            timeouts,
            resizes,
            final_size: sender.size(),
        };
        log::info!(
            "[client] transfer complete: {} chunk(s), {} retransmission(s)",
            report.chunks,
            report.retransmissions
        );
        Ok(report)
    }

    /// Read and discard late acks until the server closes its side.  Closing
    /// with unread data pending would reset the connection.
    async fn drain_until_closed(&mut self) {
        loop {
            match self.channel.recv_timeout(self.timeout).await {
                Ok(Some(_late_ack)) => continue,
                Ok(None) => break,
                Err(e) => {
                    log::debug!("[client] stopped draining: {e}");
                    break;
                }
            }
        }
    }

    fn set_state(&mut self, next: SessionState) {
        debug_assert!(!self.state.is_terminal(), "client already {}", self.state);
        log::debug!("[client] {} → {}", self.state, next);
        self.state = next;
    }
}
