//! Application-level three-way handshake.
//!
//! Confirms that both peers speak this protocol before any data flows:
//!
//! ```text
//!  client                     server
//!    │ ──────── SIN ────────▶   │
//!    │ ◀────── SIN/ACK ──────   │
//!    │ ──────── ACK ────────▶   │
//! ```
//!
//! Every read is bounded by a timeout.  A wrong token, an empty read, a
//! closed stream, or a timeout fails the handshake at once; there is no
//! retry.  The caller tears the connection down.

use std::time::Duration;

use thiserror::Error;

use crate::channel::{Channel, ChannelError};
use crate::frame::{self, ACK, SIN, SIN_ACK};

/// Why a handshake did not complete.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("timed out waiting for {expected}")]
    Timeout { expected: &'static str },
    #[error("peer closed the connection while waiting for {expected}")]
    Closed { expected: &'static str },
    #[error("expected {expected}, got {got:?}")]
    Unexpected { expected: &'static str, got: String },
    #[error(transparent)]
    Channel(ChannelError),
}

/// Client half: send `SIN`, await `SIN/ACK`, send `ACK`.
pub async fn initiate(channel: &mut Channel, limit: Duration) -> Result<(), HandshakeError> {
    log::debug!("[handshake] → SIN to {}", channel.peer);
    channel.send(SIN).await.map_err(HandshakeError::Channel)?;

    expect_token(channel, SIN_ACK, "SIN/ACK", limit).await?;

    log::debug!("[handshake] ← SIN/ACK; → ACK");
    channel.send(ACK).await.map_err(HandshakeError::Channel)?;
    log::info!("[handshake] complete with {}", channel.peer);
    Ok(())
}

/// Server half: await `SIN`, send `SIN/ACK`, await `ACK`.
pub async fn respond(channel: &mut Channel, limit: Duration) -> Result<(), HandshakeError> {
    log::debug!("[handshake] waiting for SIN from {}", channel.peer);
    expect_token(channel, SIN, "SIN", limit).await?;

    log::debug!("[handshake] ← SIN; → SIN/ACK");
    channel.send(SIN_ACK).await.map_err(HandshakeError::Channel)?;

    expect_token(channel, ACK, "ACK", limit).await?;
    log::info!("[handshake] complete with {}", channel.peer);
    Ok(())
}

async fn expect_token(
    channel: &mut Channel,
    token: &[u8],
    expected: &'static str,
    limit: Duration,
) -> Result<(), HandshakeError> {
    match channel.recv_timeout(limit).await {
        Ok(Some(body)) if frame::is_token(&body, token) => Ok(()),
        Ok(Some(body)) => Err(HandshakeError::Unexpected {
            expected,
            got: frame::show(&body),
        }),
        Ok(None) => Err(HandshakeError::Closed { expected }),
        Err(ChannelError::Timeout(_)) => Err(HandshakeError::Timeout { expected }),
        Err(e) => Err(HandshakeError::Channel(e)),
    }
}
