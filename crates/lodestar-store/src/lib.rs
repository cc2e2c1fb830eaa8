//! Two-tier player state store for Lodestar.
//!
//! - **Hot tier** ([`HotTier`], [`MemoryHotTier`]): fast, TTL-bearing,
//!   answers "who is online now".
//! - **Cold tier** ([`ColdTier`], [`SqliteColdTier`]): durable,
//!   upsert-only, answers "where was this player last".
//! - [`StateStore`]: the player-oriented facade the hub talks to. Either
//!   tier may be disabled.
//!
//! ```text
//! join:       load_cold ──→ set_hot
//! move:       set_hot
//! disconnect: get_hot ──→ upsert_cold ──→ delete_hot
//! ```

#![allow(async_fn_in_trait)]

mod cold;
mod error;
mod hot;
mod store;

pub use cold::{ColdTier, PersistentRecord, SqliteColdTier};
pub use error::StoreError;
pub use hot::{HotTier, MemoryHotTier};
pub use store::{DEFAULT_HOT_TTL, KEY_PREFIX, StateStore, cache_key};
