//! The pluggable state machine capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gregor_common::{DeviceId, Error, MsgId, Result, TimeOrOffset, UserId};

use crate::message::{InBandMessage, Item, Message};
use crate::state::State;

/// Builds protocol objects from their serialized or component forms.
pub trait ObjFactory: Send + Sync {
    /// Parse a persisted state.
    fn unmarshal_state(&self, bytes: &[u8]) -> Result<State>;

    /// Parse a persisted outbox message.
    fn unmarshal_message(&self, bytes: &[u8]) -> Result<Message>;

    /// Rebuild a message id from its byte form.
    fn make_msg_id(&self, bytes: &[u8]) -> Result<MsgId>;

    /// Turn a state item back into the in-band message that created it.
    fn make_in_band_message_from_item(&self, item: &Item) -> Result<InBandMessage>;

    /// Assemble a state from items.
    fn make_state(&self, items: Vec<Item>) -> Result<State>;
}

/// Factory for the protocol types defined in this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultObjFactory;

impl ObjFactory for DefaultObjFactory {
    fn unmarshal_state(&self, bytes: &[u8]) -> Result<State> {
        State::unmarshal(bytes)
    }

    fn unmarshal_message(&self, bytes: &[u8]) -> Result<Message> {
        Message::from_bytes(bytes)
    }

    fn make_msg_id(&self, bytes: &[u8]) -> Result<MsgId> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput("message id cannot be empty".to_string()));
        }
        Ok(MsgId::new(bytes))
    }

    fn make_in_band_message_from_item(&self, item: &Item) -> Result<InBandMessage> {
        if item.msg_id().is_empty() {
            return Err(Error::InvalidInput("item has no message id".to_string()));
        }
        Ok(InBandMessage::from_item(item))
    }

    fn make_state(&self, items: Vec<Item>) -> Result<State> {
        Ok(State::new(items))
    }
}

/// Holds canonical protocol state together with the device's pending
/// outbound messages and local dismissals.
///
/// Implementations serialize their own mutations: each method is atomic on
/// its own, but no ordering is guaranteed across calls.
#[async_trait]
pub trait StateMachine: Send + Sync {
    /// Whether this machine relies on the client for durability.
    ///
    /// Only ephemeral machines may be saved to or restored from local
    /// storage.
    fn is_ephemeral(&self) -> bool;

    /// Factory for protocol objects understood by this machine.
    fn obj_factory(&self) -> &dyn ObjFactory;

    /// Drop all server-derived content.
    ///
    /// The outbox and local dismissals are kept.
    async fn clear(&self) -> Result<()>;

    /// State visible to `device` at `at`.
    async fn state(&self, user: &UserId, device: &DeviceId, at: TimeOrOffset) -> Result<State>;

    /// Install a full state, replacing the items of every user it contains.
    async fn init_state(&self, state: State) -> Result<()>;

    /// Apply one message to canonical state.
    ///
    /// Returns the in-band message that was applied, or `None` for
    /// out-of-band messages.
    async fn consume_message(&self, msg: &Message) -> Result<Option<InBandMessage>>;

    /// Queue a locally originated message for delivery.
    async fn consume_outbox_message(&self, user: &UserId, msg: &Message) -> Result<()>;

    /// Record that the device dismissed `id` ahead of the server.
    async fn consume_local_dismissal(&self, user: &UserId, id: &MsgId) -> Result<()>;

    /// Pending outbound messages in enqueue order.
    async fn outbox(&self, user: &UserId) -> Result<Vec<Message>>;

    /// Replace the outbox.
    async fn init_outbox(&self, user: &UserId, msgs: Vec<Message>) -> Result<()>;

    /// Ids dismissed locally but not yet removed by the server.
    async fn local_dismissals(&self, user: &UserId) -> Result<Vec<MsgId>>;

    /// Replace the local dismissal set.
    async fn init_local_dismissals(&self, user: &UserId, ids: Vec<MsgId>) -> Result<()>;

    /// Creation time of the newest consumed in-band message.
    async fn latest_ctime(&self, user: &UserId, device: &DeviceId) -> Option<DateTime<Utc>>;

    /// Consumed in-band messages created at or after `since`.
    async fn in_band_messages_since(
        &self,
        user: &UserId,
        device: &DeviceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<InBandMessage>>;
}
