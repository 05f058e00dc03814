//! Server-versioned state and sync results.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use gregor_common::{Error, MsgId, Result};

use crate::message::{InBandMessage, Item};

/// A snapshot of a user's items.
///
/// Two states with the same [`State::hash`] are treated as equal; no
/// field-by-field comparison is ever performed during sync.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct State {
    items: Vec<Item>,
}

impl State {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &MsgId) -> bool {
        self.items.iter().any(|it| it.msg_id() == id)
    }

    /// Deterministic content digest (Blake2b-256).
    ///
    /// Items are sorted by message id before hashing, so the digest does not
    /// depend on the order items were inserted. Every field is length-prefixed.
    pub fn hash(&self) -> Vec<u8> {
        let mut sorted: Vec<&Item> = self.items.iter().collect();
        sorted.sort_by(|a, b| a.msg_id().cmp(b.msg_id()));

        let mut hasher = Blake2b::<U32>::new();
        hasher.update((sorted.len() as u64).to_le_bytes());
        for item in sorted {
            let md = &item.metadata;
            update_field(&mut hasher, md.msg_id.as_bytes());
            update_field(&mut hasher, md.uid.as_bytes());
            update_field(
                &mut hasher,
                md.device_id.as_ref().map(|d| d.as_bytes()).unwrap_or_default(),
            );
            hasher.update(timestamp_nanos(md.ctime).to_le_bytes());
            match item.dtime {
                Some(d) => {
                    hasher.update([1u8]);
                    hasher.update(timestamp_nanos(d).to_le_bytes());
                }
                None => hasher.update([0u8]),
            }
            update_field(&mut hasher, item.category.as_bytes());
            update_field(&mut hasher, &item.body);
        }
        hasher.finalize().to_vec()
    }

    /// Serialize to bytes for local persistence.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse a state previously produced by [`State::marshal`].
    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

fn update_field(hasher: &mut Blake2b<U32>, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn timestamp_nanos(t: chrono::DateTime<chrono::Utc>) -> i128 {
    i128::from(t.timestamp()) * 1_000_000_000 + i128::from(t.timestamp_subsec_nanos())
}

/// Incremental sync response: messages since a time plus the server's hash
/// of the resulting state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub msgs: Vec<InBandMessage>,
    pub hash: Vec<u8>,
}

/// A sync payload obtained out of band, e.g. piggy-backed on another call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAllNotification {
    /// Full canonical state; handled by a fresh sync.
    State(State),
    /// Incremental delta; handled by an incremental sync.
    Incremental(SyncResult),
}
