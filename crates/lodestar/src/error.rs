//! Unified error type for the Lodestar hub.

use lodestar_broadcast::BroadcastError;
use lodestar_protocol::ProtocolError;
use lodestar_store::StoreError;
use lodestar_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps every layer's error.
///
/// Embedders of the `lodestar` crate deal with this single type; the
/// `#[from]` conversions let `?` lift layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LodestarError {
    /// Listener, handshake, or socket I/O failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A hot- or cold-tier operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The broadcast dispatcher is no longer running.
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// A configuration value was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
