//! Incremental and fresh reconciliation against the server.

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use gregor_common::{Error, Result, TimeOrOffset};
use gregor_protocol::{InBandMessage, Message, State, StateArg, SyncAllNotification, SyncArg, SyncResult};

use crate::client::Inner;

impl Inner {
    /// Incremental sync with fresh-sync fallback on hash mismatch.
    pub(crate) async fn sync(
        &self,
        previous: Option<SyncAllNotification>,
    ) -> Result<Vec<InBandMessage>> {
        let previous_result = match previous {
            Some(SyncAllNotification::State(state)) => {
                debug!("using previously obtained state result for fresh sync");
                return self.fresh_sync(Some(state)).await;
            }
            Some(SyncAllNotification::Incremental(result)) => {
                debug!("using previously obtained incremental result");
                Some(result)
            }
            None => None,
        };

        let since = self
            .sm
            .latest_ctime(&self.identity.user, &self.identity.device)
            .await;
        match self.sync_from_time(since, previous_result).await {
            Err(e) if e.is_hash_mismatch() => {
                info!("hash check failure, falling back to fresh sync: {}", e);
                self.fresh_sync(None).await
            }
            other => other,
        }
    }

    /// Apply messages created at or after `since` and verify the resulting
    /// state against the server's hash.
    ///
    /// Messages are applied in the order the server returned them.
    pub(crate) async fn sync_from_time(
        &self,
        since: Option<DateTime<Utc>>,
        previous_result: Option<SyncResult>,
    ) -> Result<Vec<InBandMessage>> {
        let SyncResult { msgs: incoming, hash: remote_hash } = match previous_result {
            Some(result) => {
                debug!("skipping sync call, data previously obtained");
                result
            }
            None => {
                debug!("incremental sync, start time: {:?}", since);
                let arg = SyncArg {
                    uid: self.identity.user.clone(),
                    device_id: self.identity.device.clone(),
                    ctime: since,
                };
                timeout(self.config.sync_timeout, self.incoming.sync(arg))
                    .await
                    .map_err(|_| {
                        Error::Timeout(format!(
                            "sync call exceeded {:?}",
                            self.config.sync_timeout
                        ))
                    })??
            }
        };

        debug!("consuming {} messages", incoming.len());
        let mut msgs = Vec::with_capacity(incoming.len());
        for ibm in incoming {
            debug!("consuming msgid: {}", ibm.msg_id());
            // A message the state machine rejects surfaces as a hash mismatch.
            if let Err(e) = self.sm.consume_message(&Message::InBand(ibm.clone())).await {
                warn!("failed to consume message {}: {}", ibm.msg_id(), e);
            }
            msgs.push(ibm);
        }

        let state = self
            .sm
            .state(&self.identity.user, &self.identity.device, TimeOrOffset::Now)
            .await?;
        debug!("state items after sync: {}", state.len());
        for item in state.items() {
            debug!("state item: {}", item.msg_id());
        }

        let local_hash = state.hash();
        if local_hash != remote_hash {
            return Err(Error::hash_mismatch(&local_hash, &remote_hash));
        }
        Ok(msgs)
    }

    /// Replace all server-derived content with a full snapshot.
    ///
    /// Uses `state` when given, otherwise fetches it. The snapshot is
    /// fetched before anything is cleared, so a failed fetch leaves the
    /// current state in place.
    pub(crate) async fn fresh_sync(&self, state: Option<State>) -> Result<Vec<InBandMessage>> {
        let state = match state {
            Some(state) => {
                debug!("fresh sync: skipping state call, data previously obtained");
                state
            }
            None => self.fetch_state().await?,
        };

        self.sm.clear().await?;
        let msgs = self.in_band_messages_from_state(&state);
        self.sm.init_state(state).await?;

        info!("fresh sync installed {} items", msgs.len());
        Ok(msgs)
    }

    async fn fetch_state(&self) -> Result<State> {
        let arg = StateArg {
            uid: self.identity.user.clone(),
            device_id: self.identity.device.clone(),
            time_or_offset: TimeOrOffset::Now,
        };
        timeout(self.config.state_timeout, self.incoming.state(arg))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "state call exceeded {:?}",
                    self.config.state_timeout
                ))
            })?
    }

    pub(crate) fn in_band_messages_from_state(&self, state: &State) -> Vec<InBandMessage> {
        let factory = self.sm.obj_factory();
        state
            .items()
            .iter()
            .filter_map(|item| match factory.make_in_band_message_from_item(item) {
                Ok(ibm) => Some(ibm),
                Err(e) => {
                    debug!("skipping state item {}: {}", item.msg_id(), e);
                    None
                }
            })
            .collect()
    }
}
