//! Save and restore of the client's ephemeral state machine.

use tracing::{debug, info, warn};

use gregor_common::{Error, Result, TimeOrOffset};
use gregor_protocol::Message;
use gregor_storage::StoredSnapshot;

use crate::client::Inner;

impl Inner {
    pub(crate) async fn save(&self) -> Result<()> {
        if !self.sm.is_ephemeral() {
            return Err(Error::NonEphemeral);
        }

        let user = &self.identity.user;
        let state = self
            .sm
            .state(user, &self.identity.device, TimeOrOffset::Now)
            .await?
            .marshal()?;
        let local_dismissals = self
            .sm
            .local_dismissals(user)
            .await?
            .iter()
            .map(|id| id.as_bytes().to_vec())
            .collect();
        let outbox = self
            .sm
            .outbox(user)
            .await?
            .iter()
            .map(Message::to_bytes)
            .collect::<Result<Vec<_>>>()?;

        self.storage
            .store(
                user,
                StoredSnapshot {
                    state,
                    outbox,
                    local_dismissals,
                },
            )
            .await
    }

    pub(crate) async fn restore(&self) -> Result<()> {
        if !self.sm.is_ephemeral() {
            return Err(Error::NonEphemeral);
        }

        let user = &self.identity.user;
        let snapshot = self.storage.load(user).await?;

        let factory = self.sm.obj_factory();
        let state = factory
            .unmarshal_state(&snapshot.state)
            .map_err(|e| Error::Serialization(format!("failed to unmarshal state: {}", e)))?;
        let local_dismissals = snapshot
            .local_dismissals
            .iter()
            .map(|b| factory.make_msg_id(b))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::Serialization(format!("failed to unmarshal msg id: {}", e)))?;
        let outbox = snapshot
            .outbox
            .iter()
            .map(|b| factory.unmarshal_message(b))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| {
                Error::Serialization(format!("failed to unmarshal outbox message: {}", e))
            })?;

        let (items, queued) = (state.len(), outbox.len());
        self.sm.init_local_dismissals(user, local_dismissals).await?;
        self.sm.init_state(state).await?;
        self.sm.init_outbox(user, outbox).await?;

        info!(
            "restored {} items and {} outbox messages for {}",
            items, queued, self.identity
        );
        Ok(())
    }

    /// Best-effort save after a successful mutation.
    pub(crate) async fn checkpoint(&self, context: &str) {
        if !self.sm.is_ephemeral() {
            debug!("{}: state machine is durable, skipping save", context);
            return;
        }
        if let Err(e) = self.save().await {
            warn!("{}: error saving state: {}", context, e);
        }
    }
}
