//! Connection tracking for Lodestar.
//!
//! - [`ConnectionRegistry`]: every live connection and the player bound
//!   to it, with snapshots the broadcast dispatcher can iterate freely.
//! - [`SessionPhase`]: the per-connection state machine
//!   (`Connecting → Registered → Joined → Disconnected`).
//!
//! # How it fits in the stack
//!
//! ```text
//! Broadcast / lifecycle (above)  ← read snapshots, bind players
//!     ↕
//! Session layer (this crate)     ← who is connected, as whom
//!     ↕
//! Transport (below)              ← ConnectionId, Connection handles
//! ```

mod registry;
mod session;

pub use registry::{ConnectionRegistry, Registered, Snapshot};
pub use session::SessionPhase;
