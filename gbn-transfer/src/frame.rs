//! Wire-format definitions for protocol messages.
//!
//! Every message exchanged between peers is a short ASCII token or frame.
//! This module is responsible for:
//! - Defining the exact bytes of the handshake and negotiation tokens.
//! - Serialising data frames and acknowledgements into message bodies.
//! - Parsing received bodies back into typed values, returning errors for
//!   malformed input.
//!
//! No I/O happens here.  Message
//! boundaries are handled one layer down by [`crate::channel`].
//!
//! # Wire format
//!
//! ```text
//!  data frame   <seq decimal> ':' <raw payload bytes>     e.g. "7:hello:world"
//!  done frame   "DONE" ':' <total decimal>                e.g. "DONE:12"
//!  ack          <cumulative decimal> [ '|' <new size> ]   e.g. "6" or "6|120"
//!  size reply   <max size decimal>                        e.g. "100"
//! ```
//!
//! Only the first `:` of a data frame is a delimiter; the payload may contain
//! further colons.  The cumulative ack is `-1` before anything has been
//! delivered.

use thiserror::Error;

/// Handshake open, client → server.
pub const SIN: &[u8] = b"SIN";
/// Handshake acknowledgement, server → client.
pub const SIN_ACK: &[u8] = b"SIN/ACK";
/// Handshake completion, client → server.
pub const ACK: &[u8] = b"ACK";
/// Size negotiation request, client → server.
pub const MAX_SIZE_REQ: &[u8] = b"MAX_SIZE_REQ";
/// Sequence-field marker of the end-of-transfer frame.
pub const DONE: &[u8] = b"DONE";

const SEQ_DELIMITER: u8 = b':';
const SIZE_DELIMITER: u8 = b'|';

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a received body could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// A data frame had no `:` separating the sequence number from the payload.
    #[error("frame has no sequence delimiter")]
    MissingDelimiter,
    /// The sequence field was not a non-negative decimal integer.
    #[error("invalid sequence number {0:?}")]
    InvalidSequence(String),
    /// The cumulative ack field was not a decimal integer (or `-1`).
    #[error("invalid cumulative ack {0:?}")]
    InvalidAck(String),
    /// A size token was empty, non-numeric, or zero.
    #[error("invalid size {0:?}")]
    InvalidSize(String),
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Strip leading and trailing ASCII whitespace from a received token.
pub fn trim_token(buf: &[u8]) -> &[u8] {
    let start = buf
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(buf.len());
    let end = buf
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &buf[start..end]
}

/// `true` when `buf`, after trimming, is exactly `token`.
pub fn is_token(buf: &[u8], token: &[u8]) -> bool {
    trim_token(buf) == token
}

/// Printable rendering of a received body for log and error messages.
pub fn show(buf: &[u8]) -> String {
    String::from_utf8_lossy(trim_token(buf)).into_owned()
}

/// Encode the negotiated maximum payload size as an ASCII decimal string.
pub fn encode_size(size: usize) -> Vec<u8> {
    size.to_string().into_bytes()
}

/// Parse the server's size reply.  Zero is rejected: a zero-byte chunk size
/// can never make progress.
pub fn parse_size(buf: &[u8]) -> Result<usize, FrameError> {
    let text = std::str::from_utf8(trim_token(buf))
        .map_err(|_| FrameError::InvalidSize(show(buf)))?;
    match text.parse::<usize>() {
        Ok(0) | Err(_) => Err(FrameError::InvalidSize(text.to_string())),
        Ok(size) => Ok(size),
    }
}

// ---------------------------------------------------------------------------
// Data frames
// ---------------------------------------------------------------------------

/// One sequenced chunk on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub seq: u64,
    pub payload: Vec<u8>,
}

impl DataFrame {
    /// Serialise as `"<seq>:" + payload`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = format!("{}:", self.seq).into_bytes();
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Anything the sender may put on the wire after negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    /// End of transfer; carries the sender's final chunk count.
    Done { total: u64 },
}

/// Serialise the end-of-transfer marker.
pub fn encode_done(total: u64) -> Vec<u8> {
    let mut buf = DONE.to_vec();
    buf.push(SEQ_DELIMITER);
    buf.extend_from_slice(total.to_string().as_bytes());
    buf
}

/// Parse a frame body received during the transfer phase.
pub fn parse_frame(buf: &[u8]) -> Result<Frame, FrameError> {
    let split = buf
        .iter()
        .position(|&b| b == SEQ_DELIMITER)
        .ok_or(FrameError::MissingDelimiter)?;
    let (head, rest) = (&buf[..split], &buf[split + 1..]);
    let head = trim_token(head);

    if head == DONE {
        let total = parse_u64(rest).ok_or_else(|| FrameError::InvalidSequence(show(rest)))?;
        return Ok(Frame::Done { total });
    }

    let seq = parse_u64(head).ok_or_else(|| FrameError::InvalidSequence(show(head)))?;
    Ok(Frame::Data(DataFrame {
        seq,
        payload: rest.to_vec(),
    }))
}

fn parse_u64(buf: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(trim_token(buf)).ok()?;
    // `u64::from_str` accepts a leading '+'; the wire format does not.
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

// ---------------------------------------------------------------------------
// Acknowledgements
// ---------------------------------------------------------------------------

/// A cumulative acknowledgement, optionally carrying a size directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Highest index delivered in order, or `None` when nothing has been.
    pub cumulative: Option<u64>,
    /// New maximum payload size the receiver asks the sender to adopt.
    pub new_size: Option<usize>,
}

impl Ack {
    pub fn encode(&self) -> Vec<u8> {
        let mut text = match self.cumulative {
            Some(n) => n.to_string(),
            None => "-1".to_string(),
        };
        if let Some(size) = self.new_size {
            text.push(SIZE_DELIMITER as char);
            text.push_str(&size.to_string());
        }
        text.into_bytes()
    }

    /// Parse an ack body.
    ///
    /// The size field is read leniently: every non-digit byte is stripped
    /// first.  A size field that leaves no digits, overflows, or is zero
    /// produces an ack without a directive rather than an error.
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        let buf = trim_token(buf);
        let (head, size_field) = match buf.iter().position(|&b| b == SIZE_DELIMITER) {
            Some(i) => (&buf[..i], Some(&buf[i + 1..])),
            None => (buf, None),
        };

        let head = trim_token(head);
        let cumulative = if head == b"-1" {
            None
        } else {
            Some(parse_u64(head).ok_or_else(|| FrameError::InvalidAck(show(head)))?)
        };

        let new_size = size_field.and_then(|field| {
            let digits: String = field
                .iter()
                .filter(|b| b.is_ascii_digit())
                .map(|&b| b as char)
                .collect();
            digits.parse::<usize>().ok().filter(|&s| s > 0)
        });

        Ok(Self {
            cumulative,
            new_size,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
