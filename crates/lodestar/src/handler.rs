//! Per-connection handler: registration, message routing, and disconnect
//! write-back.
//!
//! Each accepted connection gets its own Tokio task running
//! [`serve_connection`]. The flow is:
//!   1. Register the connection so it starts receiving broadcasts
//!   2. Loop: receive a frame → decode → classify → act → enqueue
//!   3. On close, error, or read timeout: unregister, write the cached
//!      pose back to the cold tier, drop the hot entry, announce `leave`

use std::sync::Arc;
use std::time::Duration;

use lodestar_protocol::{Codec, Inbound, MessageKind, PlayerId, PlayerState, Pose};
use lodestar_session::SessionPhase;
use lodestar_store::{ColdTier, HotTier};
use lodestar_transport::{Connection, ConnectionId, TransportError};

use crate::{HubContext, LodestarError};

/// Drop guard that runs the disconnect path if the handler never reaches
/// it, e.g. because the task panicked or was aborted.
///
/// `Drop` is synchronous, so the cleanup is spawned as its own task.
struct DisconnectGuard<C: Connection, H: HotTier, K: ColdTier> {
    conn: Arc<C>,
    ctx: Arc<HubContext<C, H, K>>,
    armed: bool,
}

impl<C: Connection, H: HotTier, K: ColdTier> Drop for DisconnectGuard<C, H, K> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // No runtime means the process is going down; nothing to flush.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let conn = Arc::clone(&self.conn);
        let ctx = Arc::clone(&self.ctx);
        runtime.spawn(async move {
            disconnect(conn.as_ref(), ctx.as_ref()).await;
        });
    }
}

/// Handles a single connection from accept to close.
///
/// Never fails: malformed frames are dropped, store errors are logged,
/// and the connection is always unregistered and closed on the way out.
pub async fn serve_connection<C, H, K>(conn: Arc<C>, ctx: Arc<HubContext<C, H, K>>)
where
    C: Connection,
    H: HotTier,
    K: ColdTier,
{
    let conn_id = ctx.registry.register(Arc::clone(&conn));
    let mut guard = DisconnectGuard {
        conn: Arc::clone(&conn),
        ctx: Arc::clone(&ctx),
        armed: true,
    };
    let mut phase = SessionPhase::default();
    phase.register();

    loop {
        let data = match next_frame(conn.as_ref(), ctx.config.read_timeout).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(TransportError::TimedOut) => {
                tracing::info!(%conn_id, "connection timed out");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let frame: PlayerState = match ctx.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "dropping malformed frame");
                continue;
            }
        };

        route(conn.as_ref(), conn_id, ctx.as_ref(), &mut phase, frame).await;
    }

    guard.armed = false;
    if let Some(player_id) = phase.disconnect() {
        tracing::debug!(%conn_id, %player_id, "session ended");
    }
    disconnect(conn.as_ref(), ctx.as_ref()).await;
}

/// Waits for the next inbound frame, honouring the read deadline.
async fn next_frame<C: Connection>(
    conn: &C,
    read_timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>, TransportError> {
    match read_timeout {
        Some(limit) => tokio::time::timeout(limit, conn.recv())
            .await
            .map_err(|_| TransportError::TimedOut)?,
        None => conn.recv().await,
    }
}

/// Acts on one decoded frame, then queues it for everyone else.
async fn route<C, H, K>(
    conn: &C,
    conn_id: ConnectionId,
    ctx: &HubContext<C, H, K>,
    phase: &mut SessionPhase,
    frame: PlayerState,
) where
    C: Connection,
    H: HotTier,
    K: ColdTier,
{
    match Inbound::classify(&frame) {
        Inbound::Join { id, pose, action } => {
            phase.join(&id);
            handle_join(conn, conn_id, ctx, id, pose, action).await;
        }
        Inbound::Chat { id, text } => {
            tracing::trace!(%conn_id, player_id = %id, len = text.len(), "chat");
        }
        Inbound::Update(state) => {
            if let Err(e) = ctx.store.set_hot(&state, ctx.config.hot_ttl).await {
                tracing::warn!(%conn_id, player_id = %state.id, error = %e, "failed to cache player state");
            }
        }
        Inbound::Passthrough => {}
    }

    if let Err(e) = ctx.broadcast.enqueue(frame, Some(conn_id)) {
        tracing::debug!(%conn_id, error = %e, "frame not broadcast");
    }
}

/// Binds the player, restores its last position, and replays the world
/// to the joiner.
///
/// The sequence is not atomic: two joins for the same id racing on
/// different connections may interleave their reads and writes.
async fn handle_join<C, H, K>(
    conn: &C,
    conn_id: ConnectionId,
    ctx: &HubContext<C, H, K>,
    id: PlayerId,
    pose: Pose,
    action: String,
) where
    C: Connection,
    H: HotTier,
    K: ColdTier,
{
    ctx.registry.bind(conn_id, id.clone());
    tracing::info!(%conn_id, player_id = %id, "player joined");

    let restored = match ctx.store.load_cold(&id).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(player_id = %id, error = %e, "cold lookup failed, using join payload");
            None
        }
    };

    let state = match restored {
        Some(record) => {
            tracing::debug!(player_id = %id, last_seen = %record.last_seen, "restored last position");
            PlayerState::at(MessageKind::Move, id.clone(), record.pose)
        }
        None => PlayerState {
            action,
            ..PlayerState::at(MessageKind::Join, id.clone(), pose)
        },
    };

    if let Err(e) = ctx.store.set_hot(&state, ctx.config.hot_ttl).await {
        tracing::warn!(player_id = %id, error = %e, "failed to cache player state");
    }

    if let Err(e) = send_direct(conn, ctx, &state).await {
        tracing::debug!(%conn_id, error = %e, "failed to echo join state");
        return;
    }

    let online = match ctx.store.list_hot_online().await {
        Ok(online) => online,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list online players");
            Vec::new()
        }
    };
    for other in online.iter().filter(|p| p.id != id) {
        if let Err(e) = send_direct(conn, ctx, other).await {
            tracing::debug!(%conn_id, error = %e, "failed to replay online player");
            break;
        }
    }
}

/// Writes one frame straight to `conn`, bypassing the dispatcher.
async fn send_direct<C, H, K>(
    conn: &C,
    ctx: &HubContext<C, H, K>,
    state: &PlayerState,
) -> Result<(), LodestarError>
where
    C: Connection,
    H: HotTier,
    K: ColdTier,
{
    let bytes = ctx.codec.encode(state)?;
    match ctx.config.write_timeout {
        Some(limit) => tokio::time::timeout(limit, conn.send(&bytes))
            .await
            .map_err(|_| TransportError::TimedOut)??,
        None => conn.send(&bytes).await?,
    }
    Ok(())
}

/// Unregisters the connection and, if a player was bound, writes its
/// cached pose back, drops the cache entry, and announces `leave`.
///
/// Safe to run twice: the second run finds nothing registered and only
/// repeats the (idempotent) close.
async fn disconnect<C, H, K>(conn: &C, ctx: &HubContext<C, H, K>)
where
    C: Connection,
    H: HotTier,
    K: ColdTier,
{
    let conn_id = conn.id();

    if let Some(player_id) = ctx.registry.unregister(conn_id) {
        write_back(ctx, &player_id).await;

        if let Err(e) = ctx.store.delete_hot(&player_id).await {
            tracing::warn!(%player_id, error = %e, "failed to drop cached state");
        }
        if let Err(e) = ctx.broadcast.enqueue(PlayerState::leave(player_id.clone()), None) {
            tracing::debug!(%player_id, error = %e, "leave not broadcast");
        }
        tracing::info!(%conn_id, %player_id, "player left");
    }

    if let Err(e) = conn.close_within(ctx.config.write_timeout).await {
        tracing::trace!(%conn_id, error = %e, "close after disconnect");
    }
}

/// Copies the player's cached pose into the cold tier. Failures lose the
/// position; they are logged and never retried.
async fn write_back<C, H, K>(ctx: &HubContext<C, H, K>, player_id: &PlayerId)
where
    C: Connection,
    H: HotTier,
    K: ColdTier,
{
    match ctx.store.get_hot(player_id).await {
        Ok(Some(state)) => {
            if let Err(e) = ctx.store.upsert_cold(player_id, state.pose()).await {
                tracing::error!(%player_id, error = %e, "write-back failed, last position lost");
            }
        }
        Ok(None) => {
            tracing::debug!(%player_id, "no cached state to write back");
        }
        Err(e) => {
            tracing::error!(%player_id, error = %e, "cached state unreadable, last position lost");
        }
    }
}
