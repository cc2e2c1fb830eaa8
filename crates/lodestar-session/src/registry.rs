//! The connection registry: every live connection and the player bound
//! to it.
//!
//! # Concurrency
//!
//! The registry is shared by every connection task and by the broadcast
//! dispatcher. Readers and writers never wait on each other for long:
//!
//! - The table is an immutable `Arc<HashMap>`. [`snapshot`] hands out a
//!   clone of that `Arc`, so iterating it never blocks a writer and a
//!   writer never invalidates an iteration in progress.
//! - Writers swap in a new table under a short write lock
//!   (`Arc::make_mut` copies the map only while a snapshot is alive).
//!
//! [`snapshot`]: ConnectionRegistry::snapshot

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use lodestar_protocol::PlayerId;
use lodestar_transport::{Connection, ConnectionId};

/// One registry entry: the shared connection handle plus its bound player.
pub struct Registered<C> {
    conn: Arc<C>,
    player: Option<PlayerId>,
}

impl<C> Registered<C> {
    /// The connection handle.
    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    /// The player bound by the last `join`, if any.
    pub fn player(&self) -> Option<&PlayerId> {
        self.player.as_ref()
    }
}

// Manual impl: cloning an entry clones the `Arc`, never the connection,
// so `C` itself does not need to be `Clone`.
impl<C> Clone for Registered<C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            player: self.player.clone(),
        }
    }
}

/// A point-in-time view of the registry, safe to iterate while other
/// tasks register and unregister connections.
pub type Snapshot<C> = Arc<HashMap<ConnectionId, Registered<C>>>;

/// Tracks live connections and the player identity bound to each.
///
/// Nothing here enforces one connection per player: two connections may
/// bind the same id, and both stay registered and both receive
/// broadcasts.
pub struct ConnectionRegistry<C> {
    table: RwLock<Snapshot<C>>,
}

impl<C: Connection> ConnectionRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Adds a connection with no bound player. From now on it receives
    /// broadcasts.
    pub fn register(&self, conn: Arc<C>) -> ConnectionId {
        let id = conn.id();
        self.update(|table| {
            table.insert(id, Registered { conn, player: None });
        });
        tracing::debug!(conn_id = %id, "connection registered");
        id
    }

    /// Binds `player` to a registered connection, replacing any earlier
    /// binding. An empty id clears the binding.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn bind(&self, conn_id: ConnectionId, player: PlayerId) -> bool {
        let player = (!player.is_empty()).then_some(player);
        let bound = self.update(|table| match table.get_mut(&conn_id) {
            Some(entry) => {
                entry.player = player.clone();
                true
            }
            None => false,
        });
        if bound {
            if let Some(player_id) = &player {
                tracing::debug!(%conn_id, %player_id, "connection bound to player");
            }
        }
        bound
    }

    /// Removes a connection and returns the player it was bound to.
    ///
    /// Idempotent: removing an absent connection returns `None`.
    pub fn unregister(&self, conn_id: ConnectionId) -> Option<PlayerId> {
        if !self.read().contains_key(&conn_id) {
            return None;
        }
        let removed = self.update(|table| table.remove(&conn_id));
        let player = removed.and_then(|entry| entry.player);
        tracing::debug!(%conn_id, player_id = ?player, "connection unregistered");
        player
    }

    /// Returns the current set of connections for fan-out.
    pub fn snapshot(&self) -> Snapshot<C> {
        Arc::clone(&self.read())
    }

    /// Returns the handle of a registered connection.
    pub fn get(&self, conn_id: ConnectionId) -> Option<Arc<C>> {
        self.read().get(&conn_id).map(|e| Arc::clone(&e.conn))
    }

    /// The player bound to `conn_id`, if registered and bound.
    pub fn player_of(&self, conn_id: ConnectionId) -> Option<PlayerId> {
        self.read().get(&conn_id).and_then(|e| e.player.clone())
    }

    /// Every connection currently bound to `player`.
    pub fn connections_for(&self, player: &PlayerId) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .read()
            .iter()
            .filter(|(_, e)| e.player.as_ref() == Some(player))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> Snapshot<C> {
        // A panic while holding the lock cannot leave the table half
        // written: writers only ever swap whole maps.
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn update<T>(&self, f: impl FnOnce(&mut HashMap<ConnectionId, Registered<C>>) -> T) -> T {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }
}

impl<C: Connection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
