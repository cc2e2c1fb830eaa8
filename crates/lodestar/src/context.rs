//! Shared hub state handed to every connection task.

use std::sync::Arc;

use lodestar_broadcast::{BroadcastConfig, BroadcastEngine, BroadcastHandle};
use lodestar_protocol::JsonCodec;
use lodestar_session::ConnectionRegistry;
use lodestar_store::{ColdTier, HotTier, StateStore};
use lodestar_transport::Connection;

use crate::HubConfig;

/// Everything a connection task needs: the registry, the store, the
/// dispatcher handle, and the settings.
///
/// Built once per hub and shared behind an `Arc`. There is no global
/// instance; two hubs in one process are fully independent.
pub struct HubContext<C: Connection, H: HotTier, K: ColdTier> {
    pub registry: Arc<ConnectionRegistry<C>>,
    pub store: StateStore<H, K>,
    pub broadcast: BroadcastHandle,
    pub codec: JsonCodec,
    pub config: HubConfig,
}

impl<C: Connection, H: HotTier, K: ColdTier> HubContext<C, H, K> {
    /// Creates the registry and spawns the broadcast dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: StateStore<H, K>, config: HubConfig) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcast = BroadcastEngine::spawn(
            Arc::clone(&registry),
            JsonCodec,
            BroadcastConfig {
                write_timeout: config.write_timeout,
            },
        );

        tracing::debug!(
            hot = store.hot_enabled(),
            cold = store.cold_enabled(),
            "hub context ready"
        );

        Arc::new(Self {
            registry,
            store,
            broadcast,
            codec: JsonCodec,
            config,
        })
    }
}
