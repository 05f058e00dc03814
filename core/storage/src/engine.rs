//! Storage engine trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gregor_common::{Result, UserId};

/// Everything the client persists for one user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Marshaled state.
    pub state: Vec<u8>,
    /// Serialized outbox messages, in enqueue order.
    pub outbox: Vec<Vec<u8>>,
    /// Serialized locally dismissed message ids.
    pub local_dismissals: Vec<Vec<u8>>,
}

/// Key-addressed blob store for client snapshots.
#[async_trait]
pub trait LocalStorageEngine: Send + Sync {
    /// Get the engine name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Replace the snapshot stored for `user`.
    ///
    /// # Errors
    /// - I/O or serialization errors
    async fn store(&self, user: &UserId, snapshot: StoredSnapshot) -> Result<()>;

    /// Load the snapshot stored for `user`.
    ///
    /// # Errors
    /// - `NotFound` if nothing was stored for `user`
    /// - I/O or serialization errors
    async fn load(&self, user: &UserId) -> Result<StoredSnapshot>;
}
