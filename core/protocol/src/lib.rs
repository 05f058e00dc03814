//! Gregor protocol model.
//!
//! This crate defines what the client synchronizes and with whom:
//! - Items, messages and the server-versioned [`State`] with its content hash
//! - The pluggable [`StateMachine`] capability and its [`ObjFactory`]
//! - The [`IncomingClient`] interface to the remote gregor endpoint
//! - [`MemoryStateMachine`], an ephemeral in-memory state machine
//!
//! # Design Principles
//! - The state machine serializes its own mutations; every trait method is
//!   independently atomic
//! - The state hash is the only divergence oracle, so it must be
//!   deterministic and independent of item order

pub mod incoming;
pub mod machine;
pub mod memory;
pub mod message;
pub mod state;

pub use incoming::{IncomingClient, StateArg, SyncArg};
pub use machine::{DefaultObjFactory, ObjFactory, StateMachine};
pub use memory::MemoryStateMachine;
pub use message::{Creation, Dismissal, InBandMessage, Item, Message, Metadata, OutOfBandMessage};
pub use state::{State, SyncAllNotification, SyncResult};
