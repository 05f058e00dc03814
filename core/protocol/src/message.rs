//! Protocol messages and the items they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gregor_common::{DeviceId, Error, MsgId, Result, UserId};

/// Metadata attached to every in-band message and state item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique id of the message within the user's state.
    pub msg_id: MsgId,
    /// Owner of the message.
    pub uid: UserId,
    /// Device the message is scoped to. `None` means every device.
    pub device_id: Option<DeviceId>,
    /// Creation time assigned by the originator.
    pub ctime: DateTime<Utc>,
}

impl Metadata {
    /// Metadata for a message visible to all of the user's devices.
    pub fn new(msg_id: MsgId, uid: UserId, ctime: DateTime<Utc>) -> Self {
        Self {
            msg_id,
            uid,
            device_id: None,
            ctime,
        }
    }

    /// Restrict the message to a single device.
    pub fn for_device(mut self, device: DeviceId) -> Self {
        self.device_id = Some(device);
        self
    }

    /// Whether a reader on `device` may see this message.
    pub fn visible_to(&self, device: &DeviceId) -> bool {
        self.device_id.as_ref().map_or(true, |d| d == device)
    }
}

/// Payload of an in-band message that creates a state item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creation {
    /// Application-defined category (e.g. "chat.unread").
    pub category: String,
    /// Opaque item body.
    pub body: Vec<u8>,
    /// Optional expiry. Expired items drop out of state.
    pub dtime: Option<DateTime<Utc>>,
}

/// Payload of an in-band message that removes state items.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dismissal {
    /// Items to remove.
    pub msg_ids: Vec<MsgId>,
}

/// One entry of the server-versioned state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub metadata: Metadata,
    pub category: String,
    pub body: Vec<u8>,
    pub dtime: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(metadata: Metadata, category: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata,
            category: category.into(),
            body: body.into(),
            dtime: None,
        }
    }

    pub fn with_dtime(mut self, dtime: DateTime<Utc>) -> Self {
        self.dtime = Some(dtime);
        self
    }

    pub fn msg_id(&self) -> &MsgId {
        &self.metadata.msg_id
    }

    /// Whether the item has expired at `at`.
    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.dtime.is_some_and(|d| d <= at)
    }
}

/// A message that is consumed into state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InBandMessage {
    pub metadata: Metadata,
    /// Item created by this message, if any.
    pub creation: Option<Creation>,
    /// Items removed by this message, if any.
    pub dismissal: Option<Dismissal>,
}

impl InBandMessage {
    /// A message creating an item with the given category and body.
    pub fn create(metadata: Metadata, category: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata,
            creation: Some(Creation {
                category: category.into(),
                body: body.into(),
                dtime: None,
            }),
            dismissal: None,
        }
    }

    /// A message dismissing the given items.
    pub fn dismiss(metadata: Metadata, msg_ids: Vec<MsgId>) -> Self {
        Self {
            metadata,
            creation: None,
            dismissal: Some(Dismissal { msg_ids }),
        }
    }

    /// A message recreating `item`.
    pub fn from_item(item: &Item) -> Self {
        Self {
            metadata: item.metadata.clone(),
            creation: Some(Creation {
                category: item.category.clone(),
                body: item.body.clone(),
                dtime: item.dtime,
            }),
            dismissal: None,
        }
    }

    pub fn msg_id(&self) -> &MsgId {
        &self.metadata.msg_id
    }

    /// The state item this message creates, if it creates one.
    pub fn to_item(&self) -> Option<Item> {
        self.creation.as_ref().map(|c| Item {
            metadata: self.metadata.clone(),
            category: c.category.clone(),
            body: c.body.clone(),
            dtime: c.dtime,
        })
    }
}

/// A message routed to a system handler without touching state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfBandMessage {
    pub uid: UserId,
    pub system: String,
    pub body: Vec<u8>,
}

/// Any protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    InBand(InBandMessage),
    OutOfBand(OutOfBandMessage),
}

impl Message {
    pub fn in_band(&self) -> Option<&InBandMessage> {
        match self {
            Message::InBand(m) => Some(m),
            Message::OutOfBand(_) => None,
        }
    }

    /// Serialize the message to its byte form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse a message from its byte form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl From<InBandMessage> for Message {
    fn from(m: InBandMessage) -> Self {
        Message::InBand(m)
    }
}

impl From<OutOfBandMessage> for Message {
    fn from(m: OutOfBandMessage) -> Self {
        Message::OutOfBand(m)
    }
}
