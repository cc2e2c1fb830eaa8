//! # Lodestar
//!
//! A real-time presence hub for multiplayer web clients.
//!
//! Clients connect over WebSocket and exchange small JSON frames
//! (`join`, `move`, `chat`, `leave`). The hub fans every frame out to
//! every other connection, keeps each player's latest state in a TTL hot
//! tier, and writes the last position to a durable cold tier on
//! disconnect so it can be restored on the next join.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lodestar::prelude::*;
//!
//! # async fn start() -> Result<(), LodestarError> {
//! let config = HubConfig::from_env()?;
//! let server = HubServer::builder().config(config).build().await?;
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod server;

pub use config::{
    ColdStoreConfig, ConfigError, ENV_BIND, ENV_DB_PATH, ENV_HANDSHAKE_TIMEOUT_SECS,
    ENV_HOT_CACHE, ENV_HOT_TTL_SECS, ENV_READ_TIMEOUT_SECS, ENV_SHUTDOWN_GRACE_SECS, ENV_WRITE_TIMEOUT_SECS, HubConfig,
};
pub use context::HubContext;
pub use error::LodestarError;
pub use handler::serve_connection;
pub use server::{HubServer, HubServerBuilder};

/// Everything needed to run a hub or plug in custom tiers.
pub mod prelude {
    pub use crate::{
        ColdStoreConfig, HubConfig, HubContext, HubServer, HubServerBuilder, LodestarError,
        serve_connection,
    };
    pub use lodestar_broadcast::{BroadcastError, BroadcastHandle};
    pub use lodestar_protocol::{Codec, Inbound, JsonCodec, MessageKind, PlayerId, PlayerState, Pose};
    pub use lodestar_session::{ConnectionRegistry, SessionPhase};
    pub use lodestar_store::{
        ColdTier, HotTier, MemoryHotTier, PersistentRecord, SqliteColdTier, StateStore,
        StoreError,
    };
    pub use lodestar_transport::{Connection, ConnectionId, TransportError};
}
