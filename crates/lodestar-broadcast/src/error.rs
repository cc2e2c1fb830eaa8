//! Error types for the broadcast layer.

/// Errors returned by a [`BroadcastHandle`](crate::BroadcastHandle).
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// The dispatcher task has stopped; nothing more will be delivered.
    #[error("broadcast dispatcher stopped")]
    Stopped,
}
