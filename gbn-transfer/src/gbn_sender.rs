//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] splits a blob into sequenced chunks and maintains a sliding
//! window of up to `N` chunks that have been sent but not yet acknowledged.
//!
//! # Protocol contract
//!
//! - Chunk indices are zero-based and contiguous.
//! - At most `window_size` chunks may be in flight at once.
//! - ACKs are **cumulative**: ack `N` means the receiver holds every chunk
//!   with index `<= N`.  The window slides to `base = N + 1`.
//! - On timeout, the caller retransmits **all** chunks from `base` onwards
//!   (go back to N).  [`GbnSender::on_timeout`] rewinds `next_seq` so that the
//!   ordinary send path does it.
//! - A size directive carried by an ack changes the size of chunks that have
//!   **never** been transmitted.  Those are re-split losslessly; chunks that
//!   were already on the wire keep their original bytes so retransmissions
//!   are identical to the first copy.
//!
//! This module only manages state; all channel I/O is the caller's
//! responsibility.

use crate::frame::{Ack, DataFrame};

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One slice of the blob, identified by its position in `chunks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub payload: Vec<u8>,
    /// Total number of times this chunk has been transmitted.
    pub tx_count: u32,
}

fn split(bytes: &[u8], size: usize) -> impl Iterator<Item = Chunk> + '_ {
    bytes.chunks(size).map(|c| Chunk {
        payload: c.to_vec(),
        tx_count: 0,
    })
}

// ---------------------------------------------------------------------------
// SizeDirective
// ---------------------------------------------------------------------------

/// The maximum payload size currently in effect, with a version that
/// increments every time a new size is adopted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeDirective {
    pub bytes: usize,
    pub version: u32,
}

// ---------------------------------------------------------------------------
// AckOutcome
// ---------------------------------------------------------------------------

/// What a single ack did to the sender state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckOutcome {
    /// Number of chunks newly acknowledged (window slide distance).
    pub acked: usize,
    /// New payload size adopted because of this ack.
    pub resized: Option<usize>,
    /// A directive was present but dynamic sizing is disabled.
    pub directive_ignored: bool,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one transfer.
///
/// # Index layout
///
/// ```text
///   base        next_seq     sent_high          total
///     │             │            │                │
///  ───┼─────────────┼────────────┼────────────────┼──▶ chunk index
///     │<─ in flight ▶│<─ resend ─▶│<─ never sent ─▶│
/// ```
///
/// `next_seq` only trails `sent_high` after a timeout rewound it.
#[derive(Debug)]
pub struct GbnSender {
    /// Index of the **oldest** unacked chunk (left window edge).
    pub base: usize,

    /// Index of the next chunk to transmit.
    pub next_seq: usize,

    /// Number of distinct indices ever transmitted.
    sent_high: usize,

    /// Maximum number of chunks that may be in flight simultaneously (N).
    window_size: usize,

    chunks: Vec<Chunk>,

    size: SizeDirective,
}

impl GbnSender {
    /// Split `blob` at `max_size` boundaries and create an idle sender.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` or `window_size` is zero.
    pub fn new(blob: &[u8], max_size: usize, window_size: usize) -> Self {
        assert!(max_size >= 1, "max_size must be at least 1");
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            sent_high: 0,
            window_size,
            chunks: split(blob, max_size).collect(),
            size: SizeDirective {
                bytes: max_size,
                version: 0,
            },
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// `true` once every chunk has been cumulatively acknowledged.
    pub fn is_complete(&self) -> bool {
        self.base == self.chunks.len()
    }

    /// `true` when the window has room and there is a chunk to put in it.
    pub fn can_send(&self) -> bool {
        self.next_seq < self.base + self.window_size && self.next_seq < self.chunks.len()
    }

    /// Number of chunks sent (or queued for resend) but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.next_seq - self.base
    }

    /// Payload size currently in effect for never-sent chunks.
    pub fn size(&self) -> SizeDirective {
        self.size
    }

    /// Read-only view of every chunk, in index order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Sum over all chunks of transmissions beyond the first.
    pub fn retransmissions(&self) -> u64 {
        self.chunks
            .iter()
            .map(|c| u64::from(c.tx_count.saturating_sub(1)))
            .sum()
    }

    /// Take the next frame to transmit and advance `next_seq`.
    ///
    /// Returns `None` when the window is full or every chunk has been sent.
    pub fn next_frame(&mut self) -> Option<DataFrame> {
        if !self.can_send() {
            return None;
        }
        let seq = self.next_seq;
        let chunk = &mut self.chunks[seq];
        debug_assert!(
            seq < self.sent_high || chunk.payload.len() <= self.size.bytes,
            "never-sent chunk {seq} exceeds the size in effect"
        );
        chunk.tx_count += 1;
        let frame = DataFrame {
            seq: seq as u64,
            payload: chunk.payload.clone(),
        };
        self.next_seq += 1;
        self.sent_high = self.sent_high.max(self.next_seq);
        Some(frame)
    }

    /// Acknowledgement timer expired: nothing past `base` is confirmed.
    ///
    /// Rewinds `next_seq` to `base` and returns how many chunks the rewind
    /// put back in the send queue.
    pub fn on_timeout(&mut self) -> usize {
        let rewound = self.next_seq - self.base;
        self.next_seq = self.base;
        rewound
    }

    /// Process one acknowledgement.
    ///
    /// A size directive is applied first (only when `dynamic` is set), then
    /// the cumulative ack.  Ack `N` is accepted only when
    /// `base <= N < sent_high`; stale or out-of-range values leave the
    /// window where it is.
    pub fn on_ack(&mut self, ack: &Ack, dynamic: bool) -> AckOutcome {
        let mut outcome = AckOutcome::default();

        if let Some(new_size) = ack.new_size {
            if !dynamic {
                outcome.directive_ignored = true;
            } else if self.adopt_size(new_size) {
                outcome.resized = Some(new_size);
            }
        }

        let acked_up_to = ack.cumulative.and_then(|n| usize::try_from(n).ok());
        if let Some(n) = acked_up_to {
            if n >= self.base && n < self.sent_high {
                outcome.acked = n + 1 - self.base;
                self.base = n + 1;
                self.next_seq = self.next_seq.max(self.base);
            }
        }

        outcome
    }

    /// Switch never-sent chunks to `new_size`.
    ///
    /// Returns `false` when the size is zero or already in effect.
    pub fn adopt_size(&mut self, new_size: usize) -> bool {
        if new_size == 0 || new_size == self.size.bytes {
            return false;
        }
        let tail: Vec<u8> = self
            .chunks
            .drain(self.sent_high..)
            .flat_map(|c| c.payload)
            .collect();
        self.chunks.extend(split(&tail, new_size));
        self.size = SizeDirective {
            bytes: new_size,
            version: self.size.version + 1,
        };
        true
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
