//! Local filesystem storage engine.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::engine::{LocalStorageEngine, StoredSnapshot};
use gregor_common::{Error, Result, UserId};

/// On-disk document for one user.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    state: String,
    outbox: Vec<String>,
    local_dismissals: Vec<String>,
}

impl SnapshotFile {
    fn encode(snapshot: &StoredSnapshot) -> Self {
        Self {
            state: BASE64.encode(&snapshot.state),
            outbox: snapshot.outbox.iter().map(|b| BASE64.encode(b)).collect(),
            local_dismissals: snapshot
                .local_dismissals
                .iter()
                .map(|b| BASE64.encode(b))
                .collect(),
        }
    }

    fn decode(self) -> Result<StoredSnapshot> {
        let decode = |s: &str| {
            BASE64
                .decode(s)
                .map_err(|e| Error::Serialization(format!("invalid base64 blob: {}", e)))
        };

        Ok(StoredSnapshot {
            state: decode(&self.state)?,
            outbox: self
                .outbox
                .iter()
                .map(|s| decode(s))
                .collect::<Result<_>>()?,
            local_dismissals: self
                .local_dismissals
                .iter()
                .map(|s| decode(s))
                .collect::<Result<_>>()?,
        })
    }
}

/// Local filesystem storage engine.
///
/// Stores one JSON document per user under a root directory. Each write goes
/// to its own temporary file that is renamed over the previous document, so
/// concurrent stores for one user never share a partially written file.
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Create a new engine rooted at the given directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    fn user_path(&self, user: &UserId) -> PathBuf {
        self.root.join(format!("{}.json", user))
    }
}

#[async_trait]
impl LocalStorageEngine for LocalFileStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn store(&self, user: &UserId, snapshot: StoredSnapshot) -> Result<()> {
        let path = self.user_path(user);
        let tmp_path = self
            .root
            .join(format!("{}.{}.tmp", user, Uuid::new_v4().simple()));

        let doc = serde_json::to_vec(&SnapshotFile::encode(&snapshot))
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let written = match fs::write(&tmp_path, &doc).await {
            Ok(()) => fs::rename(&tmp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!("stored {} bytes for user {}", doc.len(), user);
        Ok(())
    }

    async fn load(&self, user: &UserId) -> Result<StoredSnapshot> {
        let path = self.user_path(user);

        if !path.exists() {
            return Err(Error::NotFound(format!("no stored state for user {}", user)));
        }

        let doc = fs::read(&path).await?;
        let file: SnapshotFile =
            serde_json::from_slice(&doc).map_err(|e| Error::Serialization(e.to_string()))?;
        file.decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tmp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .count()
    }

    fn snapshot() -> StoredSnapshot {
        StoredSnapshot {
            state: vec![0, 1, 2, 255],
            outbox: vec![b"first".to_vec(), b"second".to_vec()],
            local_dismissals: vec![vec![9, 9]],
        }
    }

    #[tokio::test]
    async fn test_store_load() {
        let temp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp.path()).unwrap();
        let user = UserId::new(b"alice".to_vec());

        storage.store(&user, snapshot()).await.unwrap();
        assert_eq!(storage.load(&user).await.unwrap(), snapshot());
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let temp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp.path()).unwrap();
        let user = UserId::new(b"alice".to_vec());

        storage.store(&user, snapshot()).await.unwrap();
        storage.store(&user, StoredSnapshot::default()).await.unwrap();

        assert_eq!(storage.load(&user).await.unwrap(), StoredSnapshot::default());
        assert_eq!(tmp_files(temp.path()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stores_for_one_user() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(LocalFileStorage::new(temp.path()).unwrap());
        let user = UserId::new(b"alice".to_vec());

        let snapshots: Vec<StoredSnapshot> = (0..8u8)
            .map(|i| StoredSnapshot {
                state: vec![i; 64 * 1024],
                outbox: vec![vec![i; 16]],
                local_dismissals: vec![vec![i]],
            })
            .collect();

        for _ in 0..20 {
            let handles: Vec<_> = snapshots
                .iter()
                .cloned()
                .map(|snapshot| {
                    let storage = storage.clone();
                    let user = user.clone();
                    tokio::spawn(async move { storage.store(&user, snapshot).await })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let loaded = storage.load(&user).await.unwrap();
            assert!(snapshots.contains(&loaded));
        }
        assert_eq!(tmp_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn test_users_are_separate() {
        let temp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp.path()).unwrap();
        let alice = UserId::new(b"alice".to_vec());
        let bob = UserId::new(b"bob".to_vec());

        storage.store(&alice, snapshot()).await.unwrap();
        assert!(matches!(storage.load(&bob).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp.path()).unwrap();
        let user = UserId::new(b"alice".to_vec());

        std::fs::write(temp.path().join(format!("{}.json", user)), b"garbage").unwrap();
        assert!(matches!(
            storage.load(&user).await,
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_creates_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("gregor");
        LocalFileStorage::new(&root).unwrap();
        assert!(root.is_dir());
    }
}
