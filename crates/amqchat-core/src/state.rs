//! Session lifecycle states
//!
//! The session manager walks a linear lifecycle:
//! `Disconnected → Connecting → Active → (failure) → Disconnected → … →
//! Terminated`. The retry budget lives in the manager, not here.

use std::fmt;

/// Lifecycle state of one participant's connection to the room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; a retry may follow
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Connected, receive task running, send loop live
    Active,
    /// Retry budget exhausted or input ended; no further attempts
    Terminated,
}

impl SessionState {
    /// Whether the lifecycle has ended for this process run
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_terminated_is_terminal() {
        assert!(SessionState::Terminated.is_terminal());
        assert!(!SessionState::Disconnected.is_terminal());
        assert!(!SessionState::Connecting.is_terminal());
        assert!(!SessionState::Active.is_terminal());
    }
}
