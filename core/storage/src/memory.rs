//! In-memory storage engine for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use gregor_common::{Error, Result, UserId};

use crate::engine::{LocalStorageEngine, StoredSnapshot};

/// In-memory storage engine.
///
/// Useful for testing and for clients that only need persistence across
/// client instances within one process. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    snapshots: Arc<RwLock<HashMap<UserId, StoredSnapshot>>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot currently stored for `user`, if any.
    pub fn get(&self, user: &UserId) -> Option<StoredSnapshot> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned()
    }
}

#[async_trait]
impl LocalStorageEngine for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn store(&self, user: &UserId, snapshot: StoredSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.clone(), snapshot);
        Ok(())
    }

    async fn load(&self, user: &UserId) -> Result<StoredSnapshot> {
        self.get(user)
            .ok_or_else(|| Error::NotFound(format!("no stored state for user {}", user)))
    }
}
