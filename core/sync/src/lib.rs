//! Gregor Sync Client
//!
//! Client-side synchronization for a server-authoritative, per-device
//! notification state bus, including:
//! - Incremental sync verified by a state hash, with automatic fallback to a
//!   full resync when the hash disagrees
//! - An outbox of local writes flushed in order by a background worker
//! - Local-applied reads that merge pending dismissals and outbox messages
//!   without touching persisted state
//! - Save/restore of ephemeral state machines to local storage

pub mod client;
pub mod config;
mod local_view;
pub mod outbox;
mod persist;
mod reconcile;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use client::{Client, CreateStateMachine};
pub use config::ClientConfig;
pub use outbox::OutboxFlush;

pub use gregor_common::{DeviceId, Error, Identity, MsgId, Result, TimeOrOffset, UserId};
