//! Hot tier: a fast, TTL-bearing key/value cache.
//!
//! The hot tier answers "who is online right now". Entries expire on their
//! own after an idle window; the hub never sweeps them.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use globset::Glob;
use tokio::time::Instant;

use crate::StoreError;

/// The key/value contract the hub needs from a cache service.
///
/// This mirrors a Redis-style command set so a networked cache can be
/// plugged in without touching [`StateStore`](crate::StateStore).
pub trait HotTier: Send + Sync + 'static {
    /// Upserts `value` under `key`. The entry expires `ttl` after this
    /// call; a zero `ttl` means the entry never expires.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns the value under `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Removes `key`. Removing an absent key is not an error.
    fn del(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Lists live keys matching a glob `pattern` (`*`, `?` and `[...]`
    /// classes). An invalid pattern is an error, not an empty result.
    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// An in-process [`HotTier`] backed by a sharded concurrent map.
///
/// Deadlines are measured on the tokio clock, so tests can pause and
/// advance time. Expired entries read as misses and are evicted lazily
/// when touched.
#[derive(Default)]
pub struct MemoryHotTier {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryHotTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl HotTier for MemoryHotTier {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries
            .insert(key.to_owned(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        // The read guard must be dropped before `remove_if` takes the
        // shard's write lock.
        let live = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => None,
        };
        if live.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        Ok(live)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher = Glob::new(pattern)?.compile_matcher();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
        Ok(self
            .entries
            .iter()
            .filter(|entry| matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }
}
