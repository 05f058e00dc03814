//! Common error type for the gregor client.

use thiserror::Error;

/// Top-level error type for gregor client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote call failed at the transport level.
    #[error("Network error: {0}")]
    Network(String),

    /// A remote call did not complete before its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Local state digest disagrees with the one reported by the server.
    #[error("local state hash != server state hash (local {local}, server {remote})")]
    HashMismatch {
        /// Hex digest computed locally.
        local: String,
        /// Hex digest reported by the server.
        remote: String,
    },

    /// Save or restore was requested on a non-ephemeral state machine.
    #[error("state machine is non-ephemeral")]
    NonEphemeral,

    /// The state machine rejected an operation.
    #[error("State machine error: {0}")]
    StateMachine(String),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Build a hash mismatch error from the two raw digests.
    pub fn hash_mismatch(local: &[u8], remote: &[u8]) -> Self {
        Self::HashMismatch {
            local: hex::encode(local),
            remote: hex::encode(remote),
        }
    }

    /// Whether this error signals divergence between local and server state.
    pub fn is_hash_mismatch(&self) -> bool {
        matches!(self, Error::HashMismatch { .. })
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
