//! Wire protocol for Lodestar.
//!
//! - **Types** ([`PlayerState`], [`MessageKind`], [`Inbound`], ...): the
//!   frame that travels on the wire and its classified form.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are turned
//!   into bytes and back. The hub uses the same codec for sockets and for
//!   hot-tier cache entries.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (PlayerState → Inbound) → Hub routing
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Inbound, MessageKind, PlayerId, PlayerState, Pose};
