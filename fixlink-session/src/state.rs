/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Connection state machine for an initiated session.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> LoggedOn
//!       ^             |             |           |
//!       +-------------+-------------+-----------+
//!
//! any state -> Stopping (terminal)
//! ```
//!
//! The state lives in an [`AtomicConnectionState`] so readers never take a
//! lock; every write goes through a compare-and-swap that checks the edge.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of one session's connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromPrimitive, ToPrimitive,
)]
#[repr(u8)]
pub enum ConnectionState {
    /// No transport; a reconnect may be pending.
    Disconnected = 0,
    /// Transport connect in progress.
    Connecting = 1,
    /// Transport up, logon handshake in progress.
    Connected = 2,
    /// Logon acknowledged by the counterparty.
    LoggedOn = 3,
    /// Shutting down; no further connect attempts.
    Stopping = 4,
}

impl ConnectionState {
    /// Returns true if `next` is a legal successor of `self`.
    ///
    /// Same-state updates are allowed except out of `Stopping`, which is
    /// terminal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Connected, Connecting, Disconnected, LoggedOn, Stopping};
        match (self, next) {
            (Stopping, _) => false,
            (_, Stopping) => true,
            (Disconnected, Disconnected | Connecting) => true,
            (Connecting, Connecting | Connected | Disconnected) => true,
            (Connected, Connected | LoggedOn | Disconnected) => true,
            (LoggedOn, LoggedOn | Disconnected) => true,
            _ => false,
        }
    }

    /// Returns true once the session is logged on.
    #[must_use]
    pub const fn is_logged_on(self) -> bool {
        matches!(self, Self::LoggedOn)
    }

    /// Returns true if a transport is open.
    #[must_use]
    pub const fn has_transport(self) -> bool {
        matches!(self, Self::Connected | Self::LoggedOn)
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopping)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::LoggedOn => "LoggedOn",
            Self::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

/// Lock-free cell holding a [`ConnectionState`].
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    /// Creates a cell holding `state`.
    #[must_use]
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Reads the current state.
    #[inline]
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        // Only valid discriminants are ever stored.
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
            .unwrap_or(ConnectionState::Stopping)
    }

    /// Atomically moves to `next` if the edge is legal.
    ///
    /// # Returns
    /// `Ok(previous)` on success, `Err(current)` if the edge from the current
    /// state to `next` is not allowed.
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState, ConnectionState> {
        let mut current = self.load();
        loop {
            if !current.can_transition_to(next) {
                return Err(current);
            }
            match self.0.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => {
                    current =
                        ConnectionState::from_u8(actual).unwrap_or(ConnectionState::Stopping);
                }
            }
        }
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_happy_path_transitions() {
        let cell = AtomicConnectionState::default();
        assert_eq!(cell.load(), Disconnected);
        assert_eq!(cell.transition(Connecting), Ok(Disconnected));
        assert_eq!(cell.transition(Connected), Ok(Connecting));
        assert_eq!(cell.transition(LoggedOn), Ok(Connected));
        assert!(cell.load().is_logged_on());
        assert_eq!(cell.transition(Disconnected), Ok(LoggedOn));
    }

    #[test]
    fn test_illegal_edges_are_rejected() {
        assert!(!Disconnected.can_transition_to(LoggedOn));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connecting.can_transition_to(LoggedOn));
        assert!(!LoggedOn.can_transition_to(Connecting));

        let cell = AtomicConnectionState::default();
        assert_eq!(cell.transition(LoggedOn), Err(Disconnected));
        assert_eq!(cell.load(), Disconnected);
    }

    #[test]
    fn test_stopping_is_terminal() {
        for state in [Disconnected, Connecting, Connected, LoggedOn] {
            assert!(state.can_transition_to(Stopping));
        }
        for state in [Disconnected, Connecting, Connected, LoggedOn, Stopping] {
            assert!(!Stopping.can_transition_to(state));
        }

        let cell = AtomicConnectionState::new(LoggedOn);
        assert_eq!(cell.transition(Stopping), Ok(LoggedOn));
        assert_eq!(cell.transition(Disconnected), Err(Stopping));
        assert!(cell.load().is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(LoggedOn.to_string(), "LoggedOn");
        assert!(Connected.has_transport());
        assert!(!Connecting.has_transport());
    }
}
