//! Maximum payload size negotiation.
//!
//! Runs once, right after the handshake.  The client sends `MAX_SIZE_REQ`;
//! the server answers with its current maximum payload size as a bare ASCII
//! decimal string.  That value becomes the client's initial chunk size.

use std::time::Duration;

use thiserror::Error;

use crate::channel::{Channel, ChannelError};
use crate::config::MAX_PAYLOAD_SIZE;
use crate::frame::{self, FrameError, MAX_SIZE_REQ};

/// Why negotiation did not produce a size.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// Server side: the first post-handshake message was not `MAX_SIZE_REQ`.
    #[error("expected MAX_SIZE_REQ, got {0:?}")]
    UnexpectedRequest(String),
    /// Client side: the reply was not a positive decimal that fits a frame.
    #[error("unusable size reply: {0}")]
    InvalidReply(#[from] FrameError),
    #[error("timed out waiting for the size reply")]
    Timeout,
    #[error("peer closed the connection during negotiation")]
    Closed,
    #[error(transparent)]
    Channel(ChannelError),
}

impl From<ChannelError> for NegotiationError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Timeout(_) => Self::Timeout,
            other => Self::Channel(other),
        }
    }
}

/// Client half: ask for the maximum size and parse the answer.
pub async fn request_max_size(
    channel: &mut Channel,
    limit: Duration,
) -> Result<usize, NegotiationError> {
    log::debug!("[negotiate] → MAX_SIZE_REQ");
    channel.send(MAX_SIZE_REQ).await?;

    let reply = channel
        .recv_timeout(limit)
        .await?
        .ok_or(NegotiationError::Closed)?;
    let size = frame::parse_size(&reply)?;
    if size > MAX_PAYLOAD_SIZE {
        return Err(FrameError::InvalidSize(size.to_string()).into());
    }
    log::info!("[negotiate] max payload size is {size} byte(s)");
    Ok(size)
}

/// Server half: wait for `MAX_SIZE_REQ` and announce `max_size`.
///
/// The request read is unbounded unless `limit` is given.
pub async fn announce_max_size(
    channel: &mut Channel,
    max_size: usize,
    limit: Option<Duration>,
) -> Result<(), NegotiationError> {
    let request = match limit {
        Some(limit) => channel.recv_timeout(limit).await?,
        None => channel.recv().await?,
    }
    .ok_or(NegotiationError::Closed)?;

    if !frame::is_token(&request, MAX_SIZE_REQ) {
        return Err(NegotiationError::UnexpectedRequest(frame::show(&request)));
    }

    channel.send(&frame::encode_size(max_size)).await?;
    log::info!("[negotiate] ← MAX_SIZE_REQ; → {max_size}");
    Ok(())
}
