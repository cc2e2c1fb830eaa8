//! Per-connection session phase.
//!
//! A connection moves through four phases:
//!
//! ```text
//!   Connecting ──(register)──→ Registered ──(join)──→ Joined(id)
//!                                  │                     │  ↺ (join again)
//!                                  └────(disconnect)─────┴──→ Disconnected
//! ```
//!
//! Joining is not a precondition for anything else: a frame that carries
//! an id updates the hot tier even while the connection is still
//! `Registered`. The phase exists so the handler knows whether a
//! disconnect needs a write-back, and for logging.

use lodestar_protocol::PlayerId;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Accepted by the transport, not yet in the registry.
    #[default]
    Connecting,

    /// In the registry and receiving broadcasts, no player bound.
    Registered,

    /// Bound to a player by a `join` frame.
    Joined(PlayerId),

    /// Receive loop ended. Terminal.
    Disconnected,
}

impl SessionPhase {
    /// `Connecting → Registered`. Other phases are left unchanged.
    pub fn register(&mut self) {
        if matches!(self, Self::Connecting) {
            *self = Self::Registered;
        }
    }

    /// Records a `join`. A second join with another id rebinds the
    /// connection; a join with an empty id unbinds it, the same way the
    /// registry clears its binding.
    pub fn join(&mut self, id: &PlayerId) {
        if matches!(self, Self::Connecting | Self::Disconnected) {
            return;
        }
        *self = if id.is_empty() {
            Self::Registered
        } else {
            Self::Joined(id.clone())
        };
    }

    /// Moves to the terminal phase, returning the player that was bound.
    pub fn disconnect(&mut self) -> Option<PlayerId> {
        match std::mem::replace(self, Self::Disconnected) {
            Self::Joined(id) => Some(id),
            _ => None,
        }
    }

    /// The bound player, if any.
    pub fn player(&self) -> Option<&PlayerId> {
        match self {
            Self::Joined(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}
