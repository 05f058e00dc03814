//! Gregor client: owns the identity and wires sync, outbox and persistence
//! around a pluggable state machine.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use gregor_common::{Error, Identity, MsgId, Result, TimeOrOffset};
use gregor_protocol::{
    InBandMessage, IncomingClient, Message, State, StateMachine, SyncAllNotification,
};
use gregor_storage::LocalStorageEngine;

use crate::config::ClientConfig;
use crate::outbox::{self, OutboxFlush};

/// Builds fresh state machine instances.
///
/// Called once for the client's own machine and again for every scratch
/// machine used to compose local views.
pub type CreateStateMachine = Arc<dyn Fn() -> Arc<dyn StateMachine> + Send + Sync>;

/// State shared between the client handle and its outbox worker.
pub(crate) struct Inner {
    pub(crate) identity: Identity,
    pub(crate) sm: Arc<dyn StateMachine>,
    pub(crate) storage: Arc<dyn LocalStorageEngine>,
    pub(crate) incoming: Arc<dyn IncomingClient>,
    pub(crate) create_sm: CreateStateMachine,
    pub(crate) config: ClientConfig,
}

/// Client-side synchronization engine for one (user, device).
///
/// Keeps a local projection of the server's state, queues local writes in an
/// outbox flushed by a background worker, and checkpoints everything to local
/// storage when the state machine is ephemeral.
pub struct Client {
    inner: Arc<Inner>,
    poke_tx: mpsc::Sender<()>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Client {
    /// Create a client with the default configuration.
    ///
    /// See [`Client::with_config`].
    pub fn new<F>(
        identity: Identity,
        create_sm: F,
        storage: Arc<dyn LocalStorageEngine>,
        incoming: Arc<dyn IncomingClient>,
    ) -> Result<Self>
    where
        F: Fn() -> Arc<dyn StateMachine> + Send + Sync + 'static,
    {
        Self::with_config(identity, create_sm, storage, incoming, ClientConfig::default())
    }

    /// Create a client and start its outbox worker.
    ///
    /// # Errors
    /// - No tokio runtime is available to run the outbox worker
    /// - The outbox interval is zero
    pub fn with_config<F>(
        identity: Identity,
        create_sm: F,
        storage: Arc<dyn LocalStorageEngine>,
        incoming: Arc<dyn IncomingClient>,
        config: ClientConfig,
    ) -> Result<Self>
    where
        F: Fn() -> Arc<dyn StateMachine> + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::InvalidInput("gregor client must be created inside a tokio runtime".to_string())
        })?;
        if config.outbox_interval.is_zero() {
            return Err(Error::InvalidInput(
                "outbox interval must be non-zero".to_string(),
            ));
        }

        let create_sm: CreateStateMachine = Arc::new(create_sm);
        let inner = Arc::new(Inner {
            identity,
            sm: create_sm(),
            storage,
            incoming,
            create_sm,
            config,
        });

        let (poke_tx, poke_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel();
        runtime.spawn(outbox::run_worker(inner.clone(), poke_rx, stop_rx));

        info!(
            "gregor client created for {} (storage: {})",
            inner.identity,
            inner.storage.name()
        );

        Ok(Self {
            inner,
            poke_tx,
            stop_tx: Mutex::new(Some(stop_tx)),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The client's own state machine.
    pub fn state_machine(&self) -> &Arc<dyn StateMachine> {
        &self.inner.sm
    }

    /// Reconcile local state with the server.
    ///
    /// A `previous` result obtained through another channel is used instead
    /// of calling the server. An incremental sync whose hash check fails is
    /// replaced by a fresh sync; that failure never reaches the caller.
    ///
    /// On success the outbox worker is poked and state is checkpointed.
    /// Checkpoint failures are logged only.
    pub async fn sync(
        &self,
        previous: Option<SyncAllNotification>,
    ) -> Result<Vec<InBandMessage>> {
        let result = self.inner.sync(previous).await;
        match &result {
            Ok(msgs) => {
                debug!("sync success: {} messages", msgs.len());
                self.poke_outbox();
                self.inner.checkpoint("sync").await;
            }
            Err(e) => debug!("sync failure: {}", e),
        }
        result
    }

    /// Queue a locally originated message for delivery to the server.
    pub async fn consume_message(&self, msg: &Message) -> Result<()> {
        self.inner
            .sm
            .consume_outbox_message(&self.inner.identity.user, msg)
            .await?;
        self.poke_outbox();
        self.inner.checkpoint("consume_message").await;
        Ok(())
    }

    /// Apply a message directly to the state machine.
    pub async fn state_machine_consume_message(&self, msg: &Message) -> Result<()> {
        self.inner.sm.consume_message(msg).await?;
        self.inner.checkpoint("state_machine_consume_message").await;
        Ok(())
    }

    /// Record a local dismissal of `id`.
    pub async fn state_machine_consume_local_dismissal(&self, id: &MsgId) -> Result<()> {
        self.inner
            .sm
            .consume_local_dismissal(&self.inner.identity.user, id)
            .await?;
        self.inner
            .checkpoint("state_machine_consume_local_dismissal")
            .await;
        Ok(())
    }

    pub async fn state_machine_latest_ctime(&self) -> Option<DateTime<Utc>> {
        let Identity { user, device } = &self.inner.identity;
        self.inner.sm.latest_ctime(user, device).await
    }

    /// Consumed in-band messages created at or after `since`.
    ///
    /// With `filter_local_dismissals`, messages the device has dismissed
    /// locally are left out. If the dismissals cannot be read the unfiltered
    /// list is returned.
    pub async fn state_machine_in_band_messages_since(
        &self,
        since: DateTime<Utc>,
        filter_local_dismissals: bool,
    ) -> Result<Vec<InBandMessage>> {
        let Identity { user, device } = &self.inner.identity;
        let ibms = self
            .inner
            .sm
            .in_band_messages_since(user, device, since)
            .await?;
        if !filter_local_dismissals {
            return Ok(ibms);
        }

        let dismissed = match self.inner.local_dismissal_set().await {
            Ok(dismissed) => dismissed,
            Err(e) => {
                debug!("failed to read local dismissals, not filtering: {}", e);
                return Ok(ibms);
            }
        };

        Ok(ibms
            .into_iter()
            .filter(|ibm| {
                let keep = !dismissed.contains(ibm.msg_id());
                if !keep {
                    debug!("filtered locally dismissed message {}", ibm.msg_id());
                }
                keep
            })
            .collect())
    }

    /// State as of `at`.
    ///
    /// With `apply_local`, locally dismissed items are removed and pending
    /// outbox messages are replayed on top. Nothing persisted is modified.
    pub async fn state_machine_state(&self, at: TimeOrOffset, apply_local: bool) -> Result<State> {
        let Identity { user, device } = &self.inner.identity;
        let state = self.inner.sm.state(user, device, at).await?;
        if apply_local {
            Ok(self.inner.local_view(state).await)
        } else {
            Ok(state)
        }
    }

    /// Convert every item of `state` into the in-band message that creates it.
    ///
    /// Items the state machine's factory rejects are skipped.
    pub fn in_band_messages_from_state(&self, state: &State) -> Vec<InBandMessage> {
        self.inner.in_band_messages_from_state(state)
    }

    /// Persist state, outbox and local dismissals.
    ///
    /// # Errors
    /// - `NonEphemeral` if the state machine is durable; storage is untouched
    /// - State machine, serialization or storage errors
    pub async fn save(&self) -> Result<()> {
        self.inner.save().await
    }

    /// Reload what [`Client::save`] stored.
    ///
    /// # Errors
    /// - `NonEphemeral` if the state machine is durable; storage is untouched
    /// - `NotFound` if nothing was saved for this user
    pub async fn restore(&self) -> Result<()> {
        self.inner.restore().await
    }

    /// Wake the outbox worker without waiting for its timer.
    ///
    /// Never blocks. Pokes made while one is already pending are coalesced.
    pub fn poke_outbox(&self) {
        match self.poke_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => debug!("outbox worker is stopped, poke ignored"),
        }
    }

    /// Attempt one outbox delivery round now.
    pub async fn flush_outbox(&self) -> OutboxFlush {
        self.inner.flush_outbox().await
    }

    /// Signal the outbox worker to terminate.
    ///
    /// An in-flight delivery completes before the worker observes the
    /// signal.
    ///
    /// # Panics
    /// Panics if called more than once.
    pub fn stop(&self) {
        let stop_tx = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .expect("gregor client stopped twice");
        let _ = stop_tx.send(());
        info!("gregor client for {} stopped", self.inner.identity);
    }
}
