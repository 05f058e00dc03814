//! Read-only view of state with local dismissals and pending outbox
//! messages applied.

use std::collections::HashSet;
use tracing::{debug, warn};

use gregor_common::{MsgId, Result, TimeOrOffset};
use gregor_protocol::State;

use crate::client::Inner;

impl Inner {
    pub(crate) async fn local_dismissal_set(&self) -> Result<HashSet<MsgId>> {
        Ok(self
            .sm
            .local_dismissals(&self.identity.user)
            .await?
            .into_iter()
            .collect())
    }

    /// Compose the local view of `state`. Never fails; each stage falls back
    /// to its input when local data cannot be applied.
    pub(crate) async fn local_view(&self, state: State) -> State {
        let filtered = self.filter_local_dismissals(state).await;
        self.apply_outbox_messages(filtered).await
    }

    async fn filter_local_dismissals(&self, state: State) -> State {
        let dismissed = match self.local_dismissal_set().await {
            Ok(dismissed) => dismissed,
            Err(e) => {
                warn!("failed to read local dismissals, returning unfiltered state: {}", e);
                return state;
            }
        };
        if dismissed.is_empty() {
            return state;
        }

        let items = state
            .items()
            .iter()
            .filter(|item| {
                let keep = !dismissed.contains(item.msg_id());
                if !keep {
                    debug!("filtered locally dismissed item {}", item.msg_id());
                }
                keep
            })
            .cloned()
            .collect();

        match self.sm.obj_factory().make_state(items) {
            Ok(filtered) => filtered,
            Err(e) => {
                warn!("failed to build filtered state: {}", e);
                state
            }
        }
    }

    /// Replay the outbox on a scratch state machine seeded with `state`.
    async fn apply_outbox_messages(&self, state: State) -> State {
        let user = &self.identity.user;
        let outbox = match self.sm.outbox(user).await {
            Ok(outbox) => outbox,
            Err(e) => {
                warn!("failed to read outbox, returning state without it: {}", e);
                return state;
            }
        };
        if outbox.is_empty() {
            return state;
        }

        let scratch = (self.create_sm)();
        if let Err(e) = scratch.init_state(state.clone()).await {
            warn!("failed to seed scratch state machine: {}", e);
            return state;
        }
        for msg in &outbox {
            if let Err(e) = scratch.consume_message(msg).await {
                warn!("failed to replay outbox message: {}", e);
                return state;
            }
        }

        match scratch
            .state(user, &self.identity.device, TimeOrOffset::Now)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                warn!("failed to read replayed state: {}", e);
                state
            }
        }
    }
}
