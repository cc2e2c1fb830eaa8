//! Broadcast dispatcher: one Tokio task that owns every fan-out write.
//!
//! Connection tasks never write to each other directly. They push
//! `(frame, sender)` pairs onto an unbounded queue through a
//! [`BroadcastHandle`]; a single dispatcher task pops them in order and
//! writes each frame to every registered connection except the sender.
//!
//! One consumer gives two guarantees without per-connection locking:
//!
//! - every recipient sees frames in enqueue order;
//! - no two fan-out writes race on the same connection.

use std::sync::Arc;
use std::time::Duration;

use lodestar_protocol::{Codec, PlayerState};
use lodestar_session::ConnectionRegistry;
use lodestar_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::{mpsc, oneshot};

use crate::BroadcastError;

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Longest a single recipient write may take. A recipient that misses
    /// the deadline is closed like one whose write failed. `None` waits
    /// indefinitely.
    pub write_timeout: Option<Duration>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Commands sent to the dispatcher through its queue.
enum Command {
    /// Fan a frame out to everyone except `sender`.
    Deliver {
        frame: PlayerState,
        sender: Option<ConnectionId>,
    },

    /// Reply once every earlier command has been processed.
    Flush { done: oneshot::Sender<()> },

    /// Process everything queued so far, then stop.
    Shutdown { done: oneshot::Sender<()> },
}

/// Handle to the running dispatcher.
///
/// Cheap to clone. The dispatcher stops when [`shutdown`] is called or
/// when the last handle is dropped.
///
/// [`shutdown`]: BroadcastHandle::shutdown
#[derive(Clone)]
pub struct BroadcastHandle {
    sender: mpsc::UnboundedSender<Command>,
}

impl BroadcastHandle {
    /// Queues `frame` for every connection except `sender`.
    ///
    /// Never waits: the queue is unbounded. Pass `None` as the sender for
    /// frames the hub synthesizes itself (e.g. `leave`), which reach every
    /// registered connection.
    pub fn enqueue(
        &self,
        frame: PlayerState,
        sender: Option<ConnectionId>,
    ) -> Result<(), BroadcastError> {
        self.sender
            .send(Command::Deliver { frame, sender })
            .map_err(|_| BroadcastError::Stopped)
    }

    /// Waits until every frame queued before this call has been written.
    pub async fn flush(&self) -> Result<(), BroadcastError> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(Command::Flush { done })
            .map_err(|_| BroadcastError::Stopped)?;
        wait.await.map_err(|_| BroadcastError::Stopped)
    }

    /// Drains the queue and stops the dispatcher. Later calls to
    /// [`enqueue`](Self::enqueue) fail with [`BroadcastError::Stopped`].
    pub async fn shutdown(&self) -> Result<(), BroadcastError> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(Command::Shutdown { done })
            .map_err(|_| BroadcastError::Stopped)?;
        wait.await.map_err(|_| BroadcastError::Stopped)
    }

    /// Returns `true` once the dispatcher has stopped.
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The fan-out engine. Owns the registry view, the codec, and the write
/// policy; the queue lives beside it in the dispatcher task.
pub struct BroadcastEngine<C: Connection, K: Codec> {
    registry: Arc<ConnectionRegistry<C>>,
    codec: K,
    config: BroadcastConfig,
}

impl<C: Connection, K: Codec> BroadcastEngine<C, K> {
    /// Spawns the dispatcher task and returns a handle to it.
    pub fn spawn(
        registry: Arc<ConnectionRegistry<C>>,
        codec: K,
        config: BroadcastConfig,
    ) -> BroadcastHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            registry,
            codec,
            config,
        };
        tokio::spawn(engine.run(rx));
        BroadcastHandle { sender: tx }
    }

    async fn run(self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("broadcast dispatcher started");

        while let Some(cmd) = receiver.recv().await {
            match cmd {
                Command::Deliver { frame, sender } => self.deliver(&frame, sender).await,
                Command::Flush { done } => {
                    let _ = done.send(());
                }
                Command::Shutdown { done } => {
                    receiver.close();
                    // Anything that slipped in before `close` still goes out.
                    while let Ok(cmd) = receiver.try_recv() {
                        match cmd {
                            Command::Deliver { frame, sender } => {
                                self.deliver(&frame, sender).await
                            }
                            Command::Flush { done } | Command::Shutdown { done } => {
                                let _ = done.send(());
                            }
                        }
                    }
                    let _ = done.send(());
                    break;
                }
            }
        }

        tracing::debug!("broadcast dispatcher stopped");
    }

    /// Writes one frame to every registered connection except `sender`.
    async fn deliver(&self, frame: &PlayerState, sender: Option<ConnectionId>) {
        let bytes = match self.codec.encode(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(kind = %frame.kind, error = %e, "failed to encode broadcast frame");
                return;
            }
        };

        let snapshot = self.registry.snapshot();
        for (conn_id, entry) in snapshot.iter() {
            if Some(*conn_id) == sender {
                continue;
            }
            let conn = entry.connection();
            if let Err(e) = self.write(conn.as_ref(), &bytes).await {
                // The connection's own receive loop sees the close and runs
                // the normal unregister path. The close gets the same
                // deadline as the write: a peer that stalled the write will
                // stall the Close frame too.
                tracing::debug!(%conn_id, error = %e, "broadcast write failed, closing connection");
                if let Err(e) = conn.close_within(self.config.write_timeout).await {
                    tracing::trace!(%conn_id, error = %e, "close after failed write");
                }
            }
        }
    }

    async fn write(&self, conn: &C, bytes: &[u8]) -> Result<(), TransportError> {
        match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.send(bytes))
                .await
                .map_err(|_| TransportError::TimedOut)?,
            None => conn.send(bytes).await,
        }
    }
}
