//! Go-Back-N receive-side state machine with a reorder buffer.
//!
//! [`GbnReceiver`] tracks the next index it needs for contiguity:
//!
//! - `seq == expected` is **delivered**: appended to the reassembled store,
//!   after which any buffered run that is now contiguous is drained too.
//! - `expected < seq <= expected + REORDER_LIMIT` is **buffered** until the
//!   gap before it closes.  A second copy replaces the first.
//! - `seq > expected + REORDER_LIMIT` is **dropped**.  No sender window
//!   reaches that far, and the bound caps the reorder buffer.
//! - `seq < expected` is a **duplicate** of something already delivered and
//!   changes nothing.
//!
//! After every frame (whatever its fate) the caller should send a
//! **cumulative ACK** of [`GbnReceiver::ack_number`] = `expected - 1`, which
//! re-confirms progress to a sender that may have missed an earlier ack.
//!
//! This module only manages state; all channel I/O is the caller's
//! responsibility.

use std::collections::BTreeMap;

/// How far past `expected` an early frame may be and still be buffered.
pub const REORDER_LIMIT: u64 = 1024;

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame filled the gap; `drained` buffered frames followed it.
    InOrder { drained: usize },
    /// The frame arrived early and waits in the reorder buffer.
    Buffered,
    /// The frame was already delivered.
    Duplicate,
    /// The frame is too far ahead of `expected` and was dropped.
    TooFarAhead,
}

// ---------------------------------------------------------------------------
// Reassembly
// ---------------------------------------------------------------------------

/// Whether the reassembled bytes are known to be the whole blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyStatus {
    /// The sender announced its chunk count and every chunk arrived.
    Complete,
    /// The session ended before completion could be confirmed.
    Partial {
        /// Number of chunks delivered in order.
        delivered: u64,
        /// Chunk count announced by the sender, if it got that far.
        announced: Option<u64>,
        /// Early chunks stranded behind a gap.
        buffered: usize,
    },
}

/// Final product of a receive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembly {
    /// Delivered payloads concatenated in index order.
    pub data: Vec<u8>,
    pub chunks: u64,
    pub status: ReassemblyStatus,
}

impl Reassembly {
    pub fn is_complete(&self) -> bool {
        self.status == ReassemblyStatus::Complete
    }
}

// ---------------------------------------------------------------------------
// GbnReceiver
// ---------------------------------------------------------------------------

/// Receive-side state for one connection.
#[derive(Debug, Default)]
pub struct GbnReceiver {
    /// Next index required for contiguity.
    pub expected: u64,

    /// Early arrivals, keyed by index.  Every key is in
    /// `expected + 1..=expected + REORDER_LIMIT` when inserted.
    pending: BTreeMap<u64, Vec<u8>>,

    /// Delivered payloads; position `i` holds chunk `i`.
    delivered: Vec<Vec<u8>>,
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one inbound data frame.
    pub fn on_frame(&mut self, seq: u64, payload: Vec<u8>) -> Delivery {
        if seq < self.expected {
            return Delivery::Duplicate;
        }
        if seq - self.expected > REORDER_LIMIT {
            return Delivery::TooFarAhead;
        }
        if seq > self.expected {
            self.pending.insert(seq, payload);
            return Delivery::Buffered;
        }

        self.deliver(payload);
        let mut drained = 0;
        while let Some(next) = self.pending.remove(&self.expected) {
            self.deliver(next);
            drained += 1;
        }
        Delivery::InOrder { drained }
    }

    /// Highest index delivered in order, or `None` before the first delivery.
    pub fn ack_number(&self) -> Option<u64> {
        self.expected.checked_sub(1)
    }

    /// Delivered payloads in index order.
    pub fn delivered(&self) -> &[Vec<u8>] {
        &self.delivered
    }

    /// Number of early frames waiting in the reorder buffer.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Consume the receiver and concatenate what was delivered.
    ///
    /// `announced` is the sender's final chunk count, when it was received.
    pub fn finish(self, announced: Option<u64>) -> Reassembly {
        let buffered = self.pending.len();
        let status = match announced {
            Some(total) if total == self.expected && buffered == 0 => ReassemblyStatus::Complete,
            _ => ReassemblyStatus::Partial {
                delivered: self.expected,
                announced,
                buffered,
            },
        };
        Reassembly {
            data: self.delivered.concat(),
            chunks: self.expected,
            status,
        }
    }

    fn deliver(&mut self, payload: Vec<u8>) {
        self.delivered.push(payload);
        self.expected += 1;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
