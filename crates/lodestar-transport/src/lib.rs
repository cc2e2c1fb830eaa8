//! Transport abstraction layer for Lodestar.
//!
//! Provides the [`Transport`] and [`Connection`] traits. The hub only ever
//! talks to these traits, so the registry, the broadcast dispatcher and the
//! session lifecycle can be driven by in-memory connections in tests and by
//! WebSocket connections in production.
//!
//! The transport is assumed to deliver ordered, reliable, message-framed
//! data once a connection is established. Framing below that level
//! (the WebSocket handshake, ping/pong) never reaches the hub.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingWebSocket, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
///
/// IDs are assigned monotonically for the lifetime of the process and are
/// never reused, which makes them safe keys for the connection registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide connection ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
///
/// Accepting and handshaking are separate steps so that a client which
/// opens a socket and then goes quiet only stalls its own task, never the
/// accept loop.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// An accepted socket that has not finished its handshake.
    type Pending: Handshake<Connection = Self::Connection>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming socket. Does no protocol I/O.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// The protocol upgrade of an accepted socket.
pub trait Handshake: Send + 'static {
    type Connection: Connection;

    /// Runs the handshake. Callers bound this with a deadline.
    fn handshake(self) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive framed messages.
///
/// Implementations must allow `send` to run while another task is parked
/// in `recv`: the connection's own receive loop and the broadcast
/// dispatcher use the same handle concurrently.
pub trait Connection: Send + Sync + 'static {
    /// Sends one frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, TransportError>>
           + Send;

    /// Closes the connection. Closing twice is not an error.
    ///
    /// A task parked in [`recv`](Self::recv) must wake with `Ok(None)`
    /// without waiting for the peer to acknowledge the close.
    fn close(
        &self,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// [`close`](Self::close), giving up after `limit`. The connection is
    /// still marked closed when the deadline passes.
    fn close_within(
        &self,
        limit: Option<Duration>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send
    where
        Self: Sized,
    {
        async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, self.close())
                    .await
                    .map_err(|_| TransportError::TimedOut)?,
                None => self.close().await,
            }
        }
    }

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
