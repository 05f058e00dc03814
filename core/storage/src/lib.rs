//! Local persistence for the gregor client.
//!
//! The client checkpoints its ephemeral state machine as three blob groups
//! keyed by user: the marshaled state, the outbox (one blob per message, in
//! order) and the local dismissals (one blob per message id).
//!
//! # Design Principles
//! - Engines store opaque bytes and never interpret them
//! - Async operations: all I/O is async
//! - No mutual exclusion across concurrent stores for the same user;
//!   callers needing strict ordering coordinate externally

pub mod engine;
pub mod local;
pub mod memory;

pub use engine::{LocalStorageEngine, StoredSnapshot};
pub use local::LocalFileStorage;
pub use memory::MemoryStorage;
