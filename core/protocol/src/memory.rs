//! In-memory state machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use gregor_common::{DeviceId, Error, MsgId, Result, TimeOrOffset, UserId};

use crate::machine::{DefaultObjFactory, ObjFactory, StateMachine};
use crate::message::{InBandMessage, Item, Message};
use crate::state::State;

#[derive(Debug, Default)]
struct UserState {
    /// Canonical items in creation order.
    items: Vec<Item>,
    /// Consumed in-band messages in consumption order.
    log: Vec<InBandMessage>,
    outbox: Vec<Message>,
    local_dismissals: Vec<MsgId>,
}

impl UserState {
    fn apply(&mut self, msg: &InBandMessage) {
        if let Some(item) = msg.to_item() {
            match self.items.iter_mut().find(|it| it.msg_id() == item.msg_id()) {
                Some(existing) => *existing = item,
                None => self.items.push(item),
            }
        }

        if let Some(dismissal) = &msg.dismissal {
            self.items
                .retain(|it| !dismissal.msg_ids.contains(it.msg_id()));
            // The server has confirmed these removals.
            self.local_dismissals
                .retain(|id| !dismissal.msg_ids.contains(id));
        }

        match self.log.iter_mut().find(|m| m.msg_id() == msg.msg_id()) {
            Some(existing) => *existing = msg.clone(),
            None => self.log.push(msg.clone()),
        }
    }
}

/// Ephemeral state machine holding everything in memory.
///
/// Suitable as the client-side cache of server state, as a scratch machine
/// for composing local views, and as the backing store of test servers.
/// All data is lost on drop unless the owning client saves it.
pub struct MemoryStateMachine {
    users: RwLock<HashMap<UserId, UserState>>,
    factory: DefaultObjFactory,
    ephemeral: bool,
}

impl MemoryStateMachine {
    /// Create an empty ephemeral state machine.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            factory: DefaultObjFactory,
            ephemeral: true,
        }
    }

    /// Create a machine that reports itself as durable.
    ///
    /// Clients refuse to save or restore such a machine.
    pub fn non_ephemeral() -> Self {
        Self {
            ephemeral: false,
            ..Self::new()
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, UserState>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, UserState>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateMachine for MemoryStateMachine {
    fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    fn obj_factory(&self) -> &dyn ObjFactory {
        &self.factory
    }

    async fn clear(&self) -> Result<()> {
        for user in self.write().values_mut() {
            user.items.clear();
            user.log.clear();
        }
        Ok(())
    }

    async fn state(&self, user: &UserId, device: &DeviceId, at: TimeOrOffset) -> Result<State> {
        let cutoff = at.resolve(Utc::now())?;
        let users = self.read();
        let items = users
            .get(user)
            .map(|u| {
                u.items
                    .iter()
                    .filter(|it| it.metadata.visible_to(device))
                    .filter(|it| at == TimeOrOffset::Now || it.metadata.ctime <= cutoff)
                    .filter(|it| !it.is_expired(cutoff))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(State::new(items))
    }

    async fn init_state(&self, state: State) -> Result<()> {
        let mut grouped: HashMap<UserId, Vec<Item>> = HashMap::new();
        for item in state.into_items() {
            grouped
                .entry(item.metadata.uid.clone())
                .or_default()
                .push(item);
        }

        let mut users = self.write();
        for (uid, items) in grouped {
            let user = users.entry(uid).or_default();
            user.log = items.iter().map(InBandMessage::from_item).collect();
            user.items = items;
        }
        Ok(())
    }

    async fn consume_message(&self, msg: &Message) -> Result<Option<InBandMessage>> {
        let ibm = match msg {
            Message::InBand(ibm) => ibm,
            Message::OutOfBand(oobm) => {
                debug!("ignoring out-of-band message for system {}", oobm.system);
                return Ok(None);
            }
        };

        if ibm.msg_id().is_empty() {
            return Err(Error::StateMachine(
                "in-band message has an empty message id".to_string(),
            ));
        }

        self.write()
            .entry(ibm.metadata.uid.clone())
            .or_default()
            .apply(ibm);
        Ok(Some(ibm.clone()))
    }

    async fn consume_outbox_message(&self, user: &UserId, msg: &Message) -> Result<()> {
        self.write()
            .entry(user.clone())
            .or_default()
            .outbox
            .push(msg.clone());
        Ok(())
    }

    async fn consume_local_dismissal(&self, user: &UserId, id: &MsgId) -> Result<()> {
        let mut users = self.write();
        let dismissals = &mut users.entry(user.clone()).or_default().local_dismissals;
        if !dismissals.contains(id) {
            dismissals.push(id.clone());
        }
        Ok(())
    }

    async fn outbox(&self, user: &UserId) -> Result<Vec<Message>> {
        Ok(self
            .read()
            .get(user)
            .map(|u| u.outbox.clone())
            .unwrap_or_default())
    }

    async fn init_outbox(&self, user: &UserId, msgs: Vec<Message>) -> Result<()> {
        self.write().entry(user.clone()).or_default().outbox = msgs;
        Ok(())
    }

    async fn local_dismissals(&self, user: &UserId) -> Result<Vec<MsgId>> {
        Ok(self
            .read()
            .get(user)
            .map(|u| u.local_dismissals.clone())
            .unwrap_or_default())
    }

    async fn init_local_dismissals(&self, user: &UserId, ids: Vec<MsgId>) -> Result<()> {
        self.write().entry(user.clone()).or_default().local_dismissals = ids;
        Ok(())
    }

    async fn latest_ctime(&self, user: &UserId, device: &DeviceId) -> Option<DateTime<Utc>> {
        self.read().get(user).and_then(|u| {
            u.log
                .iter()
                .filter(|m| m.metadata.visible_to(device))
                .map(|m| m.metadata.ctime)
                .max()
        })
    }

    async fn in_band_messages_since(
        &self,
        user: &UserId,
        device: &DeviceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<InBandMessage>> {
        Ok(self
            .read()
            .get(user)
            .map(|u| {
                u.log
                    .iter()
                    .filter(|m| m.metadata.visible_to(device) && m.metadata.ctime >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
