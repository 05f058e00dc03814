//! Interface to the remote gregor endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gregor_common::{DeviceId, Result, TimeOrOffset, UserId};

use crate::message::Message;
use crate::state::{State, SyncResult};

/// Arguments of an incremental sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncArg {
    pub uid: UserId,
    pub device_id: DeviceId,
    /// Return messages created at or after this time. `None` means all.
    pub ctime: Option<DateTime<Utc>>,
}

/// Arguments of a full state request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateArg {
    pub uid: UserId,
    pub device_id: DeviceId,
    pub time_or_offset: TimeOrOffset,
}

/// Remote gregor endpoint.
///
/// Implementations handle their own transport, authentication and
/// reconnection. The client applies deadlines around `sync` and `state`;
/// `consume_message` relies on the implementation's own timeouts.
#[async_trait]
pub trait IncomingClient: Send + Sync {
    /// Messages since `arg.ctime` plus the hash of the resulting state.
    async fn sync(&self, arg: SyncArg) -> Result<SyncResult>;

    /// Full canonical state.
    async fn state(&self, arg: StateArg) -> Result<State>;

    /// Submit a message to the server.
    ///
    /// The server must tolerate redelivery of a message whose earlier
    /// acknowledgment was lost.
    async fn consume_message(&self, msg: &Message) -> Result<()>;
}
