//! Shared fixtures for client tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gregor_protocol::{
    InBandMessage, IncomingClient, Item, MemoryStateMachine, Message, Metadata, State, StateArg,
    StateMachine, SyncArg, SyncResult,
};
use gregor_storage::{LocalStorageEngine, MemoryStorage, StoredSnapshot};
use crate::{Client, ClientConfig, DeviceId, Error, Identity, MsgId, Result, TimeOrOffset, UserId};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn user() -> UserId {
    UserId::new(b"alice".to_vec())
}

pub fn device() -> DeviceId {
    DeviceId::new(b"phone".to_vec())
}

pub fn identity() -> Identity {
    Identity::new(user(), device())
}

pub fn msg_id(id: &str) -> MsgId {
    MsgId::new(id.as_bytes().to_vec())
}

pub fn create_at(id: &str, ctime: DateTime<Utc>) -> InBandMessage {
    InBandMessage::create(
        Metadata::new(msg_id(id), user(), ctime),
        "test.category",
        id.as_bytes().to_vec(),
    )
}

pub fn create(id: &str) -> InBandMessage {
    create_at(id, Utc::now())
}

pub fn dismiss(id: &str, targets: &[&str]) -> InBandMessage {
    InBandMessage::dismiss(
        Metadata::new(msg_id(id), user(), Utc::now()),
        targets.iter().map(|t| msg_id(t)).collect(),
    )
}

pub fn item(id: &str) -> Item {
    Item::new(
        Metadata::new(msg_id(id), user(), Utc::now()),
        "test.category",
        id.as_bytes().to_vec(),
    )
}

pub fn ids(state: &State) -> Vec<String> {
    let mut ids: Vec<String> = state
        .items()
        .iter()
        .map(|it| String::from_utf8_lossy(it.msg_id().as_bytes()).into_owned())
        .collect();
    ids.sort();
    ids
}

pub fn msg_ids(msgs: &[InBandMessage]) -> Vec<String> {
    msgs.iter()
        .map(|m| String::from_utf8_lossy(m.msg_id().as_bytes()).into_owned())
        .collect()
}

/// Remote endpoint backed by its own in-memory state machine.
#[derive(Default)]
pub struct LoopbackServer {
    pub sm: MemoryStateMachine,
    pub delivered: Mutex<Vec<Message>>,
    pub rejected: Mutex<HashSet<MsgId>>,
    pub sync_calls: AtomicUsize,
    pub state_calls: AtomicUsize,
    pub corrupt_hash: AtomicBool,
    pub fail_sync: AtomicBool,
    pub sync_delay: Mutex<Option<Duration>>,
    pub delivery_delay: Mutex<Option<Duration>>,
}

impl LoopbackServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish a message into canonical server state.
    pub async fn publish(&self, msg: InBandMessage) {
        self.sm.consume_message(&Message::InBand(msg)).await.unwrap();
    }

    pub async fn canonical_state(&self) -> State {
        self.sm
            .state(&user(), &device(), TimeOrOffset::Now)
            .await
            .unwrap()
    }

    pub fn reject(&self, id: &str) {
        self.rejected.lock().unwrap().insert(msg_id(id));
    }

    pub fn accept_all(&self) {
        self.rejected.lock().unwrap().clear();
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter_map(Message::in_band)
            .map(|m| String::from_utf8_lossy(m.msg_id().as_bytes()).into_owned())
            .collect()
    }
}

#[async_trait]
impl IncomingClient for LoopbackServer {
    async fn sync(&self, arg: SyncArg) -> Result<SyncResult> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.sync_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(Error::Network("connection reset".to_string()));
        }

        let since = arg.ctime.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let msgs = self
            .sm
            .in_band_messages_since(&arg.uid, &arg.device_id, since)
            .await?;
        let mut hash = self
            .sm
            .state(&arg.uid, &arg.device_id, TimeOrOffset::Now)
            .await?
            .hash();
        if self.corrupt_hash.load(Ordering::SeqCst) {
            hash = vec![0u8; hash.len()];
        }
        Ok(SyncResult { msgs, hash })
    }

    async fn state(&self, arg: StateArg) -> Result<State> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        self.sm
            .state(&arg.uid, &arg.device_id, arg.time_or_offset)
            .await
    }

    async fn consume_message(&self, msg: &Message) -> Result<()> {
        let delay = *self.delivery_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ibm) = msg.in_band() {
            let rejected = self.rejected.lock().unwrap().contains(ibm.msg_id());
            if rejected {
                return Err(Error::Network(format!("rejected {}", ibm.msg_id())));
            }
            self.sm.consume_message(msg).await?;
        }
        self.delivered.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

/// Storage wrapper that counts every call.
#[derive(Default)]
pub struct CountingStorage {
    pub inner: MemoryStorage,
    pub stores: AtomicUsize,
    pub loads: AtomicUsize,
}

impl CountingStorage {
    pub fn calls(&self) -> usize {
        self.stores.load(Ordering::SeqCst) + self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStorageEngine for CountingStorage {
    fn name(&self) -> &str {
        "counting"
    }

    async fn store(&self, user: &UserId, snapshot: StoredSnapshot) -> Result<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(user, snapshot).await
    }

    async fn load(&self, user: &UserId) -> Result<StoredSnapshot> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(user).await
    }
}

/// Storage that fails every call.
pub struct FailingStorage;

#[async_trait]
impl LocalStorageEngine for FailingStorage {
    fn name(&self) -> &str {
        "failing"
    }

    async fn store(&self, _user: &UserId, _snapshot: StoredSnapshot) -> Result<()> {
        Err(Error::Storage("disk full".to_string()))
    }

    async fn load(&self, _user: &UserId) -> Result<StoredSnapshot> {
        Err(Error::Storage("disk unreadable".to_string()))
    }
}

pub fn memory_sm() -> Arc<dyn StateMachine> {
    Arc::new(MemoryStateMachine::new())
}

pub fn client_with(
    server: Arc<LoopbackServer>,
    storage: Arc<dyn LocalStorageEngine>,
    config: ClientConfig,
) -> Client {
    init_tracing();
    Client::with_config(identity(), memory_sm, storage, server, config).unwrap()
}

pub fn client(server: Arc<LoopbackServer>, storage: Arc<dyn LocalStorageEngine>) -> Client {
    client_with(server, storage, ClientConfig::default())
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
