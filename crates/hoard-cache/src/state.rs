//! Connection lifecycle state.

use parking_lot::Mutex;
use std::fmt;

/// Lifecycle of the cache service's store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not started, or caching is disabled.
    #[default]
    Uninitialized,
    /// Pool built, first round-trip pending.
    Starting,
    /// The store answers.
    Ready,
    /// The last store call failed at the transport level.
    Degraded,
    /// Stopped; no further store calls.
    Closed,
}

impl ConnectionState {
    /// Returns true if the transition is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Uninitialized, Starting)
                | (Starting, Ready)
                | (Starting, Degraded)
                | (Ready, Degraded)
                | (Degraded, Ready)
                | (Uninitialized | Starting | Ready | Degraded, Closed)
        )
    }

    /// Returns true if store calls should be attempted.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Starting | Self::Ready | Self::Degraded)
    }

    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state cell enforcing legal transitions.
#[derive(Debug, Default)]
pub(crate) struct StateCell(Mutex<ConnectionState>);

impl StateCell {
    pub(crate) fn get(&self) -> ConnectionState {
        *self.0.lock()
    }

    /// Moves to `next` if legal, returning the previous state on success.
    pub(crate) fn transition(&self, next: ConnectionState) -> Option<ConnectionState> {
        let mut state = self.0.lock();
        let previous = *state;
        if previous.can_transition_to(next) {
            *state = next;
            Some(previous)
        } else {
            None
        }
    }

    /// Moves to `next` only from `from`.
    pub(crate) fn transition_from(&self, from: ConnectionState, next: ConnectionState) -> bool {
        let mut state = self.0.lock();
        if *state == from && from.can_transition_to(next) {
            *state = next;
            true
        } else {
            false
        }
    }
}
