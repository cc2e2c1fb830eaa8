//! Error types for the store layer.

use lodestar_protocol::ProtocolError;

/// Errors raised by a tier while the hub is running.
///
/// A tier that could not be reached at startup never produces these: it
/// is simply absent from the [`StateStore`](crate::StateStore) and every
/// operation on it is a no-op or a miss.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The cold tier's database rejected a statement.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A cached entry could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    /// The blocking task running a database call panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A thread panicked while holding the database connection.
    #[error("store connection lock poisoned")]
    Poisoned,

    /// A `keys` glob could not be parsed.
    #[error("invalid key pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// The backing service stopped answering.
    ///
    /// The in-process tiers never produce this. It is the variant for
    /// networked backends plugged in through [`HotTier`](crate::HotTier)
    /// or [`ColdTier`](crate::ColdTier), such as a cache server that
    /// dropped its connection.
    #[error("tier unavailable: {0}")]
    Unavailable(String),
}
