//! Server-side connection session.
//!
//! A [`Session`] owns everything for one accepted connection: the channel,
//! the [`GbnReceiver`], the receive allowance and the size policy.  Nothing
//! is shared with other sessions, so sessions need no locking and one
//! session's failure cannot disturb another.
//!
//! # Lifecycle
//!
//! ```text
//!  handshake ──▶ negotiation ──▶ receive loop ──▶ finish
//!      │              │               │
//!      └── Err ◀──────┘               └── peer close or I/O error:
//!                                         partial data is still finalized
//! ```
//!
//! The data-frame read has no timeout; the loop ends only when the peer
//! closes the stream or the transport fails.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::channel::{Channel, ChannelError};
use crate::config::ServerConfig;
use crate::frame::{self, Ack, Frame};
use crate::gbn_receiver::{Delivery, GbnReceiver, Reassembly};
use crate::handshake::{self, HandshakeError};
use crate::negotiation::{self, NegotiationError};
use crate::size_policy::{RandomSize, SizePolicy};
use crate::state::SessionState;

/// Receive allowance beyond the payload size, covering the sequence header.
pub const FRAME_OVERHEAD: usize = 100;

/// Setup failures; the session produced no data.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),
}

/// How the receive loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The peer closed the stream between messages.
    PeerClosed,
    /// The transport failed; the text is the underlying error.
    TransportError(String),
}

/// Everything a finished session hands to the outside world.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub peer: SocketAddr,
    pub outcome: Reassembly,
    pub termination: Termination,
    /// Data frames parsed (including duplicates and early arrivals).
    pub frames: u64,
    /// Frames dropped as malformed or over the allowance.
    pub malformed: u64,
}

/// State for one accepted connection.
pub struct Session {
    channel: Channel,
    state: SessionState,
    receiver: GbnReceiver,
    max_size: usize,
    dynamic: bool,
    /// Largest frame body the session will process.
    allowance: usize,
    size_policy: Box<dyn SizePolicy>,
    setup_timeout: Duration,
    /// Final chunk count from the sender's `DONE` frame.
    announced: Option<u64>,
    frames: u64,
    malformed: u64,
}

impl Session {
    pub fn new(channel: Channel, config: &ServerConfig) -> Self {
        Self {
            channel,
            state: SessionState::Connected,
            receiver: GbnReceiver::new(),
            max_size: config.maximum_msg_size,
            dynamic: config.dynamic_message_size,
            allowance: config.maximum_msg_size.saturating_add(FRAME_OVERHEAD),
            size_policy: Box::new(RandomSize::new()),
            setup_timeout: config.handshake_timeout,
            announced: None,
            frames: 0,
            malformed: 0,
        }
    }

    /// Replace the random size chooser (deterministic tests).
    pub fn with_size_policy(mut self, policy: impl SizePolicy + 'static) -> Self {
        self.size_policy = Box::new(policy);
        self
    }

    /// Drive the whole session.  The connection is closed when this returns.
    pub async fn run(mut self) -> Result<SessionReport, SessionError> {
        let peer = self.channel.peer;
        log::info!("[session {peer}] started");

        if let Err(e) = self.setup().await {
            self.set_state(SessionState::Failed);
            log::warn!("[session {peer}] {e}");
            return Err(e);
        }

        let termination = self.receive_loop().await;
        self.set_state(match termination {
            Termination::PeerClosed => SessionState::Closed,
            Termination::TransportError(_) => SessionState::Failed,
        });

        let outcome = self.receiver.finish(self.announced);
        log::info!(
            "[session {peer}] ended ({:?}): {} byte(s) in {} chunk(s), {:?}",
            termination,
            outcome.data.len(),
            outcome.chunks,
            outcome.status
        );
        Ok(SessionReport {
            peer,
            outcome,
            termination,
            frames: self.frames,
            malformed: self.malformed,
        })
    }

    async fn setup(&mut self) -> Result<(), SessionError> {
        handshake::respond(&mut self.channel, self.setup_timeout).await?;
        self.set_state(SessionState::Handshaken);

        negotiation::announce_max_size(&mut self.channel, self.max_size, Some(self.setup_timeout))
            .await?;
        self.set_state(SessionState::Transferring);
        Ok(())
    }

    async fn receive_loop(&mut self) -> Termination {
        loop {
            let body = match self.channel.recv().await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    log::debug!("[session {}] peer closed", self.channel.peer);
                    return Termination::PeerClosed;
                }
                Err(e) => {
                    log::warn!("[session {}] receive failed: {e}", self.channel.peer);
                    return Termination::TransportError(e.to_string());
                }
            };
            if let Err(e) = self.on_message(body).await {
                log::warn!("[session {}] send failed: {e}", self.channel.peer);
                return Termination::TransportError(e.to_string());
            }
        }
    }

    /// Handle one transfer-phase message.  Only a failed ack send is an error.
    async fn on_message(&mut self, body: Vec<u8>) -> Result<(), ChannelError> {
        let peer = self.channel.peer;

        if body.len() > self.allowance {
            self.malformed += 1;
            log::warn!(
                "[session {peer}] dropping {}-byte frame (allowance {})",
                body.len(),
                self.allowance
            );
            return Ok(());
        }

        let data = match frame::parse_frame(&body) {
            Ok(Frame::Data(data)) => data,
            Ok(Frame::Done { total }) => {
                log::debug!("[session {peer}] ← DONE total={total}");
                self.announced = Some(total);
                return Ok(());
            }
            Err(e) => {
                self.malformed += 1;
                log::warn!("[session {peer}] dropping malformed frame: {e}");
                return Ok(());
            }
        };

        self.frames += 1;
        let seq = data.seq;
        let len = data.payload.len();
        let delivery = self.receiver.on_frame(seq, data.payload);
        match delivery {
            Delivery::InOrder { drained } if drained > 0 => {
                log::debug!("[gbn] ← DATA seq={seq} len={len}; drained {drained} buffered")
            }
            Delivery::InOrder { .. } => log::debug!("[gbn] ← DATA seq={seq} len={len}"),
            Delivery::Buffered => log::debug!(
                "[gbn] ← DATA seq={seq} early (expected {}); buffered",
                self.receiver.expected
            ),
            Delivery::Duplicate => log::debug!("[gbn] ← DATA seq={seq} duplicate"),
            Delivery::TooFarAhead => log::warn!(
                "[session {peer}] dropping seq={seq}, too far ahead of {}",
                self.receiver.expected
            ),
        }

        let new_size = self.dynamic.then(|| {
            let size = self.size_policy.next_size(self.max_size);
            self.allowance = self.allowance.max(size.saturating_add(FRAME_OVERHEAD));
            size
        });
        let ack = Ack {
            cumulative: self.receiver.ack_number(),
            new_size,
        };
        let wire = ack.encode();
        self.channel.send(&wire).await?;
        log::debug!("[gbn] → ACK {}", String::from_utf8_lossy(&wire));
        Ok(())
    }

    fn set_state(&mut self, next: SessionState) {
        debug_assert!(!self.state.is_terminal(), "session already {}", self.state);
        log::debug!(
            "[session {}] {} → {}",
            self.channel.peer,
            self.state,
            next
        );
        self.state = next;
    }
}
