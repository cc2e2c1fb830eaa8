//! `HubServer` builder and server loop.
//!
//! This is the entry point for running a Lodestar hub. It ties together
//! all the layers: transport → protocol → session → store → broadcast.

use std::future::Future;
use std::sync::Arc;

use lodestar_store::{ColdTier, HotTier, MemoryHotTier, SqliteColdTier, StateStore, StoreError};
use lodestar_transport::{
    Connection, Handshake, Transport, WebSocketConnection, WebSocketTransport,
};
use tokio::task::JoinSet;

use crate::handler::serve_connection;
use crate::{ColdStoreConfig, HubConfig, HubContext, LodestarError};

/// How the builder obtains a tier.
enum TierSource<T> {
    /// Opened from [`HubConfig`] at build time.
    Configured(fn(&HubConfig) -> Result<Option<T>, StoreError>),
    /// Supplied by the caller.
    Given(T),
}

impl<T> TierSource<T> {
    /// Resolves to a tier, or `None` when disabled or unreachable.
    fn open(self, config: &HubConfig, name: &str) -> Option<T> {
        match self {
            Self::Given(tier) => Some(tier),
            Self::Configured(open) => match open(config) {
                Ok(tier) => {
                    if tier.is_none() {
                        tracing::info!(tier = name, "tier disabled by configuration");
                    }
                    tier
                }
                Err(e) => {
                    tracing::warn!(tier = name, error = %e, "tier unreachable, running without it");
                    None
                }
            },
        }
    }
}

fn open_memory_hot(config: &HubConfig) -> Result<Option<MemoryHotTier>, StoreError> {
    Ok(config.hot_store_enabled.then(MemoryHotTier::new))
}

fn open_sqlite_cold(config: &HubConfig) -> Result<Option<SqliteColdTier>, StoreError> {
    match &config.cold_store {
        ColdStoreConfig::Disabled => Ok(None),
        ColdStoreConfig::InMemory => SqliteColdTier::open_in_memory().map(Some),
        ColdStoreConfig::File(path) => SqliteColdTier::open(path).map(Some),
    }
}

/// Builder for configuring and starting a Lodestar hub.
///
/// By default the hot tier is an in-process [`MemoryHotTier`] and the
/// cold tier a [`SqliteColdTier`], both opened from the [`HubConfig`].
/// [`hot_tier`](Self::hot_tier) and [`cold_tier`](Self::cold_tier)
/// replace them with any other implementation.
///
/// # Example
///
/// ```rust,no_run
/// use lodestar::prelude::*;
///
/// # async fn start() -> Result<(), LodestarError> {
/// let server = HubServer::builder()
///     .bind("0.0.0.0:3000")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct HubServerBuilder<H = MemoryHotTier, K = SqliteColdTier> {
    config: HubConfig,
    hot: TierSource<H>,
    cold: TierSource<K>,
}

impl HubServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
            hot: TierSource::Configured(open_memory_hot),
            cold: TierSource::Configured(open_sqlite_cold),
        }
    }
}

impl Default for HubServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HotTier, K: ColdTier> HubServerBuilder<H, K> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration, including the bind address.
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `hot` as the hot tier, ignoring `hot_store_enabled`.
    pub fn hot_tier<T: HotTier>(self, hot: T) -> HubServerBuilder<T, K> {
        HubServerBuilder {
            config: self.config,
            hot: TierSource::Given(hot),
            cold: self.cold,
        }
    }

    /// Uses `cold` as the cold tier, ignoring `cold_store`.
    pub fn cold_tier<T: ColdTier>(self, cold: T) -> HubServerBuilder<H, T> {
        HubServerBuilder {
            config: self.config,
            hot: self.hot,
            cold: TierSource::Given(cold),
        }
    }

    /// Opens the tiers, binds the listener, and starts the dispatcher.
    ///
    /// A tier that cannot be opened is disabled with a warning. Only a
    /// failure to bind is fatal.
    pub async fn build(self) -> Result<HubServer<H, K>, LodestarError> {
        let hot = self.hot.open(&self.config, "hot");
        let cold = self.cold.open(&self.config, "cold");

        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let ctx = HubContext::new(StateStore::new(hot, cold), self.config);

        Ok(HubServer { transport, ctx })
    }
}

/// A bound Lodestar hub.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct HubServer<H: HotTier = MemoryHotTier, K: ColdTier = SqliteColdTier> {
    transport: WebSocketTransport,
    ctx: Arc<HubContext<WebSocketConnection, H, K>>,
}

impl HubServer {
    /// Creates a new builder.
    pub fn builder() -> HubServerBuilder {
        HubServerBuilder::new()
    }
}

impl<H: HotTier, K: ColdTier> HubServer<H, K> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The shared state every connection task sees.
    pub fn context(&self) -> &Arc<HubContext<WebSocketConnection, H, K>> {
        &self.ctx
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), LodestarError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `signal` resolves, then shuts down.
    ///
    /// Each accepted socket is upgraded in its own task, bounded by
    /// `handshake_timeout`.
    ///
    /// Shutdown stops accepting, closes every registered connection, and
    /// waits up to `shutdown_grace` for the connection tasks to finish
    /// their write-backs. Tasks still running after that are aborted
    /// (their drop guards still run the disconnect path). Finally the
    /// dispatcher drains its queue and stops.
    pub async fn run_until(
        mut self,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), LodestarError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Lodestar hub running");

        let mut tasks = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let ctx = Arc::clone(&self.ctx);
                        tasks.spawn(upgrade_and_serve(pending, ctx));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }

            // Reap finished handlers without waiting on live ones.
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    tracing::error!(error = %e, "connection task failed");
                }
            }
        }

        self.shutdown(tasks).await;
        Ok(())
    }

    async fn shutdown(&self, mut tasks: JoinSet<()>) {
        tracing::info!(connections = self.ctx.registry.len(), "shutting down");

        // Each close releases its connection's reader at once; only the
        // Close frame can stall, and each one is bounded.
        let write_timeout = self.ctx.config.write_timeout;
        let mut closing = JoinSet::new();
        for (conn_id, entry) in self.ctx.registry.snapshot().iter() {
            let conn_id = *conn_id;
            let conn = Arc::clone(entry.connection());
            closing.spawn(async move {
                if let Err(e) = conn.close_within(write_timeout).await {
                    tracing::trace!(%conn_id, error = %e, "close during shutdown");
                }
            });
        }
        while closing.join_next().await.is_some() {}

        let drained = tokio::time::timeout(self.ctx.config.shutdown_grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "connection task failed");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "shutdown grace elapsed, aborting connections");
            tasks.shutdown().await;
        }

        if let Err(e) = self.ctx.broadcast.shutdown().await {
            tracing::debug!(error = %e, "dispatcher already stopped");
        }

        tracing::info!("Lodestar hub stopped");
    }
}

/// Finishes the WebSocket upgrade inside the connection's own task, so a
/// socket that never sends its upgrade request cannot hold up the accept
/// loop.
async fn upgrade_and_serve<P, H, K>(pending: P, ctx: Arc<HubContext<P::Connection, H, K>>)
where
    P: Handshake,
    H: HotTier,
    K: ColdTier,
{
    let conn = match tokio::time::timeout(ctx.config.handshake_timeout, pending.handshake()).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "handshake failed");
            return;
        }
        Err(_) => {
            tracing::debug!("handshake timed out, dropping socket");
            return;
        }
    };
    serve_connection(Arc::new(conn), ctx).await;
}
