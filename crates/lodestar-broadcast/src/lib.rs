//! Fan-out for Lodestar.
//!
//! A single dispatcher task ([`BroadcastEngine`]) consumes a FIFO queue
//! of frames and writes each one to every registered connection except
//! its sender. Everything else talks to it through a [`BroadcastHandle`].
//!
//! # Delivery contract
//!
//! - [`BroadcastHandle::enqueue`] never blocks beyond queue admission.
//! - Each recipient receives frames in enqueue order.
//! - A frame is never delivered back to its sender.
//! - A failed or timed-out write closes that recipient and moves on. The
//!   dispatcher never retries and never unregisters anyone itself.

mod engine;
mod error;

pub use engine::{BroadcastConfig, BroadcastEngine, BroadcastHandle};
pub use error::BroadcastError;
