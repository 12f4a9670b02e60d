//! Session finite-state machine (FSM) types.
//!
//! Both peers walk the same linear sequence of phases; only the direction of
//! each message differs.  Transitions are driven by [`crate::client`] and
//! [`crate::session`], which log every change.
//!
//! ```text
//!  CONNECTED ──SIN/SIN-ACK/ACK──▶ HANDSHAKEN ──MAX_SIZE_REQ/size──▶ TRANSFERRING
//!      │                               │                                 │
//!      │ token mismatch / timeout      │ bad request / bad size          │ done, EOF,
//!      ▼                               ▼                                 ▼ or I/O error
//!    FAILED ◀──────────────────────────┘                               CLOSED
//! ```

/// All possible phases of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Transport connection exists; no application tokens exchanged yet.
    #[default]
    Connected,
    /// Three-way handshake complete; size not yet agreed.
    Handshaken,
    /// Maximum payload size agreed; data frames and acks flowing.
    Transferring,
    /// Session ended normally (completion or peer close).
    Closed,
    /// Session aborted by a protocol violation or transport error.
    Failed,
}

impl SessionState {
    /// `true` once no further protocol traffic will be processed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connected => "CONNECTED",
            Self::Handshaken => "HANDSHAKEN",
            Self::Transferring => "TRANSFERRING",
            Self::Closed => "CLOSED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connected() {
        assert_eq!(SessionState::default(), SessionState::Connected);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Transferring.is_terminal());
        assert_eq!(SessionState::Handshaken.to_string(), "HANDSHAKEN");
    }
}
