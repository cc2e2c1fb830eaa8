//! Hub configuration.
//!
//! [`HubConfig`] has sensible defaults for every field. The binary
//! overlays environment variables on top of them with
//! [`HubConfig::from_env`]; embedders usually build the struct directly.

use std::path::PathBuf;
use std::time::Duration;

use lodestar_store::DEFAULT_HOT_TTL;

/// Where the cold tier keeps its records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColdStoreConfig {
    /// No durable tier. Positions are forgotten on disconnect.
    Disabled,
    /// A private in-memory database. Survives reconnects, not restarts.
    #[default]
    InMemory,
    /// A database file on disk.
    File(PathBuf),
}

/// Settings for a [`HubServer`](crate::HubServer).
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// Idle window for hot-tier entries, refreshed on every write.
    pub hot_ttl: Duration,

    /// Longest an accepted socket may take to finish the WebSocket
    /// upgrade before it is dropped.
    pub handshake_timeout: Duration,

    /// Longest a connection may stay silent before it is dropped.
    /// `None` (the default) waits forever, so a stalled peer holds its
    /// task until the socket errors.
    pub read_timeout: Option<Duration>,

    /// Longest a single outbound write may take before the recipient is
    /// closed. Also bounds the close itself.
    pub write_timeout: Option<Duration>,

    /// How long shutdown waits for connection tasks to finish their
    /// write-backs before aborting them.
    pub shutdown_grace: Duration,

    /// Whether to run the in-process hot tier.
    pub hot_store_enabled: bool,

    /// Cold tier location.
    pub cold_store: ColdStoreConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            hot_ttl: DEFAULT_HOT_TTL,
            handshake_timeout: Duration::from_secs(10),
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(5)),
            shutdown_grace: Duration::from_secs(5),
            hot_store_enabled: true,
            cold_store: ColdStoreConfig::default(),
        }
    }
}

/// A configuration value that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

pub const ENV_BIND: &str = "LODESTAR_BIND";
pub const ENV_HOT_TTL_SECS: &str = "LODESTAR_HOT_TTL_SECS";
pub const ENV_HANDSHAKE_TIMEOUT_SECS: &str = "LODESTAR_HANDSHAKE_TIMEOUT_SECS";
pub const ENV_READ_TIMEOUT_SECS: &str = "LODESTAR_READ_TIMEOUT_SECS";
pub const ENV_WRITE_TIMEOUT_SECS: &str = "LODESTAR_WRITE_TIMEOUT_SECS";
pub const ENV_SHUTDOWN_GRACE_SECS: &str = "LODESTAR_SHUTDOWN_GRACE_SECS";
pub const ENV_HOT_CACHE: &str = "LODESTAR_HOT_CACHE";
pub const ENV_DB_PATH: &str = "LODESTAR_DB_PATH";

impl HubConfig {
    /// Defaults overlaid with `LODESTAR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// | variable | effect |
    /// |---|---|
    /// | `LODESTAR_BIND` | listen address |
    /// | `LODESTAR_HOT_TTL_SECS` | hot-tier idle window |
    /// | `LODESTAR_HANDSHAKE_TIMEOUT_SECS` | upgrade deadline for new sockets |
    /// | `LODESTAR_READ_TIMEOUT_SECS` | read deadline, `0` disables |
    /// | `LODESTAR_WRITE_TIMEOUT_SECS` | write deadline, `0` disables |
    /// | `LODESTAR_SHUTDOWN_GRACE_SECS` | shutdown grace period |
    /// | `LODESTAR_HOT_CACHE` | `off`/`false`/`0` disables the hot tier |
    /// | `LODESTAR_DB_PATH` | cold-tier file, `:memory:`, or empty to disable |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_BIND) {
            config.bind_addr = addr;
        }
        if let Some(secs) = lookup(ENV_HOT_TTL_SECS) {
            config.hot_ttl = Duration::from_secs(parse_secs(ENV_HOT_TTL_SECS, &secs)?);
        }
        if let Some(secs) = lookup(ENV_HANDSHAKE_TIMEOUT_SECS) {
            config.handshake_timeout =
                Duration::from_secs(parse_secs(ENV_HANDSHAKE_TIMEOUT_SECS, &secs)?);
        }
        if let Some(secs) = lookup(ENV_READ_TIMEOUT_SECS) {
            config.read_timeout = optional_secs(ENV_READ_TIMEOUT_SECS, &secs)?;
        }
        if let Some(secs) = lookup(ENV_WRITE_TIMEOUT_SECS) {
            config.write_timeout = optional_secs(ENV_WRITE_TIMEOUT_SECS, &secs)?;
        }
        if let Some(secs) = lookup(ENV_SHUTDOWN_GRACE_SECS) {
            config.shutdown_grace =
                Duration::from_secs(parse_secs(ENV_SHUTDOWN_GRACE_SECS, &secs)?);
        }
        if let Some(flag) = lookup(ENV_HOT_CACHE) {
            config.hot_store_enabled = !matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "off" | "false" | "0" | "no"
            );
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            config.cold_store = match path.trim() {
                "" => ColdStoreConfig::Disabled,
                ":memory:" => ColdStoreConfig::InMemory,
                file => ColdStoreConfig::File(PathBuf::from(file)),
            };
        }

        Ok(config)
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn optional_secs(var: &'static str, value: &str) -> Result<Option<Duration>, ConfigError> {
    let secs = parse_secs(var, value)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
