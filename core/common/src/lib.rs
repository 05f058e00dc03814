//! Common types shared by the gregor client crates.
//!
//! Identifiers, time selectors and the error type live here so that the
//! protocol model, the persistence layer and the client agree on them.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{DeviceId, Identity, MsgId, TimeOrOffset, UserId};
