//! The two-tier state store used by the session lifecycle.

use std::time::Duration;

use lodestar_protocol::{Codec, JsonCodec, PlayerId, PlayerState, Pose};

use crate::{ColdTier, HotTier, PersistentRecord, StoreError};

/// Prefix for every hot-tier key. A player's entry lives at `player:<id>`.
pub const KEY_PREFIX: &str = "player:";

/// Default idle window for hot-tier entries.
pub const DEFAULT_HOT_TTL: Duration = Duration::from_secs(60 * 60);

/// Returns the hot-tier key for a player.
pub fn cache_key(id: &PlayerId) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// Hot tier + cold tier behind one player-oriented API.
///
/// Either tier may be absent. An absent tier is one that could not be
/// reached when the hub started: its writes are no-ops and its reads are
/// misses, so the real-time path keeps working without persistence.
pub struct StateStore<H, K> {
    hot: Option<H>,
    cold: Option<K>,
    codec: JsonCodec,
}

impl<H: HotTier, K: ColdTier> StateStore<H, K> {
    pub fn new(hot: Option<H>, cold: Option<K>) -> Self {
        Self {
            hot,
            cold,
            codec: JsonCodec,
        }
    }

    /// A store with both tiers disabled.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn hot_enabled(&self) -> bool {
        self.hot.is_some()
    }

    pub fn cold_enabled(&self) -> bool {
        self.cold.is_some()
    }

    /// Direct access to the hot tier, if enabled.
    pub fn hot_tier(&self) -> Option<&H> {
        self.hot.as_ref()
    }

    /// Direct access to the cold tier, if enabled.
    pub fn cold_tier(&self) -> Option<&K> {
        self.cold.as_ref()
    }

    // -----------------------------------------------------------------
    // Hot tier
    // -----------------------------------------------------------------

    /// Caches `state` under its player id, resetting the idle window to
    /// `ttl`. Anonymous states are ignored.
    pub async fn set_hot(&self, state: &PlayerState, ttl: Duration) -> Result<(), StoreError> {
        let Some(hot) = &self.hot else {
            return Ok(());
        };
        if state.id.is_empty() {
            return Ok(());
        }
        let bytes = self.codec.encode(state)?;
        hot.set(&cache_key(&state.id), bytes, ttl).await
    }

    pub async fn get_hot(&self, id: &PlayerId) -> Result<Option<PlayerState>, StoreError> {
        let Some(hot) = &self.hot else {
            return Ok(None);
        };
        match hot.get(&cache_key(id)).await? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_hot(&self, id: &PlayerId) -> Result<(), StoreError> {
        match &self.hot {
            Some(hot) => hot.del(&cache_key(id)).await,
            None => Ok(()),
        }
    }

    /// Lists every player currently cached.
    ///
    /// This is a key scan followed by one read per key, not a snapshot:
    /// an entry deleted between the two steps is skipped, and one added
    /// after the scan is missed. Entries that fail to decode are skipped
    /// with a warning.
    pub async fn list_hot_online(&self) -> Result<Vec<PlayerState>, StoreError> {
        let Some(hot) = &self.hot else {
            return Ok(Vec::new());
        };

        let keys = hot.keys(&format!("{KEY_PREFIX}*")).await?;
        let mut players = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = hot.get(&key).await? else {
                continue;
            };
            match self.codec.decode::<PlayerState>(&bytes) {
                Ok(state) => players.push(state),
                Err(e) => tracing::warn!(%key, error = %e, "skipping undecodable cache entry"),
            }
        }
        Ok(players)
    }

    // -----------------------------------------------------------------
    // Cold tier
    // -----------------------------------------------------------------

    /// Persists a player's last known pose. Anonymous ids are ignored.
    pub async fn upsert_cold(&self, id: &PlayerId, pose: Pose) -> Result<(), StoreError> {
        match &self.cold {
            Some(cold) if !id.is_empty() => cold.upsert(id, pose).await,
            _ => Ok(()),
        }
    }

    pub async fn load_cold(&self, id: &PlayerId) -> Result<Option<PersistentRecord>, StoreError> {
        match &self.cold {
            Some(cold) if !id.is_empty() => cold.load(id).await,
            _ => Ok(None),
        }
    }
}
