use std::fmt;

/// Lifecycle of one transfer, on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    /// Sender: handshake written, waiting for the ready reply.
    HandshakeSent,
    /// Receiver: waiting for the peer's handshake.
    AwaitingHandshake,
    Transferring,
    /// All bytes moved; whole-file digest being checked or reported.
    Verifying,
    Complete,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns `true` if `self -> next` is a legal step.
    ///
    /// Any non-terminal state may fail.
    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        match (self, next) {
            (Idle, HandshakeSent | AwaitingHandshake) => true,
            (HandshakeSent | AwaitingHandshake, Transferring) => true,
            (Transferring, Verifying) => true,
            (Verifying, Complete) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::HandshakeSent => "handshake_sent",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Transferring => "transferring",
            Self::Verifying => "verifying",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moves `state` to `next`, logging the step.
pub(crate) fn transition(state: &mut TransferState, next: TransferState, transfer_id: &str) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal transfer state change {state} -> {next}"
    );
    tracing::debug!(transfer_id, from = %state, to = %next, "transfer state");
    *state = next;
}
