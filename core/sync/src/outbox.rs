//! Background delivery of locally queued messages.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::Inner;

/// Outcome of one outbox delivery round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutboxFlush {
    /// Messages accepted by the server and dropped from the outbox.
    pub delivered: usize,
    /// Messages left queued for the next round.
    pub remaining: usize,
}

impl Inner {
    /// Deliver queued messages in order, stopping at the first failure.
    ///
    /// The failed message and everything after it stay queued. Messages
    /// enqueued while delivery was in flight are kept behind them.
    pub(crate) async fn flush_outbox(&self) -> OutboxFlush {
        let user = &self.identity.user;
        let msgs = match self.sm.outbox(user).await {
            Ok(msgs) => msgs,
            Err(e) => {
                warn!("failed to get outbox messages: {}", e);
                return OutboxFlush::default();
            }
        };
        if msgs.is_empty() {
            return OutboxFlush::default();
        }

        let mut delivered = 0;
        for msg in &msgs {
            if let Err(e) = self.incoming.consume_message(msg).await {
                warn!(
                    "failed to deliver outbox message {} of {}: {}",
                    delivered + 1,
                    msgs.len(),
                    e
                );
                break;
            }
            delivered += 1;
        }

        let mut remaining = msgs[delivered..].to_vec();
        match self.sm.outbox(user).await {
            Ok(current) if current.starts_with(&msgs) => {
                remaining.extend_from_slice(&current[msgs.len()..]);
            }
            Ok(_) => debug!("outbox was replaced during delivery"),
            Err(e) => debug!("failed to re-read outbox: {}", e),
        }

        let flush = OutboxFlush {
            delivered,
            remaining: remaining.len(),
        };
        debug!("adding back {} outbox items", flush.remaining);
        if let Err(e) = self.sm.init_outbox(user, remaining).await {
            warn!("failed to init outbox with remaining items: {}", e);
        }
        self.checkpoint("outbox flush").await;

        flush
    }
}

/// Worker loop: flush on every timer tick and every poke until stopped or
/// until the owning client is dropped.
pub(crate) async fn run_worker(
    inner: Arc<Inner>,
    mut poke_rx: mpsc::Receiver<()>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let period = inner.config.outbox_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Outbox worker started for {}", inner.identity);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => {
                info!("Outbox worker shutting down");
                break;
            }

            poke = poke_rx.recv() => match poke {
                Some(()) => {
                    debug!("outbox poked");
                    inner.flush_outbox().await;
                }
                None => {
                    debug!("client dropped, outbox worker exiting");
                    break;
                }
            },

            _ = ticker.tick() => {
                debug!("periodic outbox flush");
                inner.flush_outbox().await;
            }
        }
    }
}
